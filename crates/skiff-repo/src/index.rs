//! Repository index types
//!
//! Two index documents are published per repository:
//! - `index.yaml`: the repository catalog ([`PackageRepoIndex`])
//! - `{name}/versions.yaml`: the versions of one package ([`PackageIndex`])
//!
//! Both may be served as YAML or JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use skiff_core::PackageScope;

use crate::error::{RepoError, Result};

/// Versions of a single package in one repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageIndex {
    #[serde(default)]
    pub versions: Vec<PackageIndexItem>,
    #[serde(default)]
    pub latest_version: String,
}

impl PackageIndex {
    pub fn contains(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v.version == version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIndexItem {
    pub version: String,
}

/// Catalog of every package a repository offers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRepoIndex {
    #[serde(default)]
    pub packages: Vec<PackageRepoIndexItem>,
}

impl PackageRepoIndex {
    /// Find a package by name
    pub fn get(&self, name: &str) -> Option<&PackageRepoIndexItem> {
        self.packages.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRepoIndexItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<PackageScope>,
}

/// Catalog merged across all repositories, sorted by package name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaIndex {
    pub packages: Vec<MetaIndexItem>,
}

impl MetaIndex {
    pub fn get(&self, name: &str) -> Option<&MetaIndexItem> {
        self.packages
            .binary_search_by(|p| p.item.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.packages[i])
    }
}

/// One merged catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaIndexItem {
    /// Display fields of the preferred repository, with the highest latest version
    #[serde(flatten)]
    pub item: PackageRepoIndexItem,
    /// Names of repositories offering this package, ascending
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<String>,
}

/// Decode a YAML or JSON document fetched from `url`
pub fn decode_document<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T> {
    let decode_err = |message: String| RepoError::Decode {
        url: url.to_string(),
        message,
    };

    let text = std::str::from_utf8(body).map_err(|e| decode_err(format!("Invalid UTF-8: {}", e)))?;

    if text.trim_start().starts_with('{') {
        serde_json::from_str(text).map_err(|e| decode_err(e.to_string()))
    } else {
        serde_yaml::from_str(text).map_err(|e| decode_err(e.to_string()))
    }
}
