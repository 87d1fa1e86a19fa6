//! Package manifest as published by a repository
//!
//! Served at `{base}/{name}/{version}/package.yaml`, in YAML or JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// Installable package descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    /// Package scope (absent means Cluster)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<PackageScope>,

    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub long_description: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<PackageReference>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_url: String,

    /// Install through a helm release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmManifest>,

    /// Install by applying plain manifests
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<PlainManifest>,

    /// Value definitions, kept as raw documents
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_definitions: BTreeMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_namespace: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoints: Vec<PackageEntrypoint>,

    /// Other packages this one needs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

impl PackageManifest {
    /// Parse a manifest from YAML (JSON is valid YAML)
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self.scope, None | Some(PackageScope::Cluster))
    }

    pub fn is_namespaced(&self) -> bool {
        matches!(self.scope, Some(PackageScope::Namespaced))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageScope {
    Cluster,
    Namespaced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReference {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmManifest {
    /// URL of the helm repository
    pub repository_url: String,
    pub chart_name: String,
    pub chart_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainManifest {
    pub url: String,
    /// Namespace for namespaced resources that do not set one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_namespace: String,
}

/// Service port exposed by a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageEntrypoint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub service_name: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<i32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scheme: String,
}

/// Dependency on another package, with an optional version constraint
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Constraint such as `>=1.2.0`; empty means any version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}
