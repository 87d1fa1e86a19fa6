//! Installed package resources
//!
//! Packages exist in two scopes: namespaced [`Package`] and cluster-wide
//! [`ClusterPackage`]. Code that does not care about the scope works with
//! [`InstalledPackage`], which wraps either one.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Condition type reported by the package operator once a package is reconciled
pub const CONDITION_READY: &str = "Ready";

/// Which package, at which version, from which repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfoTemplate {
    /// Name of the package in the repository index
    pub name: String,
    /// Desired version
    #[serde(default)]
    pub version: String,
    /// Repository to pull the package from; empty means the default repository
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository_name: String,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "packages.skiff.io",
    version = "v1alpha1",
    kind = "Package",
    namespaced,
    shortname = "pkg",
    status = "PackageStatus",
    derive = "PartialEq",
    derive = "Default",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    pub package_info: PackageInfoTemplate,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub suspend: bool,
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "packages.skiff.io",
    version = "v1alpha1",
    kind = "ClusterPackage",
    status = "PackageStatus",
    derive = "PartialEq",
    derive = "Default",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPackageSpec {
    pub package_info: PackageInfoTemplate,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub suspend: bool,
}

/// Observed state written by the package operator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageStatus {
    /// Version that is actually installed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PackageStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Kind of an installed package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    ClusterPackage,
    Package,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::ClusterPackage => write!(f, "ClusterPackage"),
            PackageKind::Package => write!(f, "Package"),
        }
    }
}

/// Either a cluster-scoped or a namespaced installed package
#[derive(Debug, Clone, PartialEq)]
pub enum InstalledPackage {
    Cluster(ClusterPackage),
    Namespaced(Package),
}

impl InstalledPackage {
    pub fn kind(&self) -> PackageKind {
        match self {
            InstalledPackage::Cluster(_) => PackageKind::ClusterPackage,
            InstalledPackage::Namespaced(_) => PackageKind::Package,
        }
    }

    /// Object name
    pub fn name(&self) -> String {
        match self {
            InstalledPackage::Cluster(p) => p.name_any(),
            InstalledPackage::Namespaced(p) => p.name_any(),
        }
    }

    /// Object namespace (`None` for cluster packages)
    pub fn namespace(&self) -> Option<String> {
        match self {
            InstalledPackage::Cluster(_) => None,
            InstalledPackage::Namespaced(p) => p.namespace(),
        }
    }

    pub fn uid(&self) -> Option<String> {
        match self {
            InstalledPackage::Cluster(p) => p.uid(),
            InstalledPackage::Namespaced(p) => p.uid(),
        }
    }

    pub fn package_info(&self) -> &PackageInfoTemplate {
        match self {
            InstalledPackage::Cluster(p) => &p.spec.package_info,
            InstalledPackage::Namespaced(p) => &p.spec.package_info,
        }
    }

    pub fn package_info_mut(&mut self) -> &mut PackageInfoTemplate {
        match self {
            InstalledPackage::Cluster(p) => &mut p.spec.package_info,
            InstalledPackage::Namespaced(p) => &mut p.spec.package_info,
        }
    }

    pub fn status(&self) -> Option<&PackageStatus> {
        match self {
            InstalledPackage::Cluster(p) => p.status.as_ref(),
            InstalledPackage::Namespaced(p) => p.status.as_ref(),
        }
    }

    /// Name of the package in its repository
    pub fn package_name(&self) -> &str {
        &self.package_info().name
    }

    /// Desired version from the spec
    pub fn desired_version(&self) -> &str {
        &self.package_info().version
    }

    pub fn repository_name(&self) -> &str {
        &self.package_info().repository_name
    }

    pub fn set_desired_version(&mut self, version: impl Into<String>) {
        self.package_info_mut().version = version.into();
    }

    /// The operator reports the desired version as installed
    pub fn is_converged(&self) -> bool {
        self.status()
            .is_some_and(|s| !s.version.is_empty() && s.version == self.desired_version())
    }

    /// The Ready condition, if the operator has reported one
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status().and_then(|s| s.condition(CONDITION_READY))
    }

    /// Whether `other` refers to the same cluster object
    pub fn is_same_object(&self, other: &InstalledPackage) -> bool {
        if self.kind() != other.kind()
            || self.name() != other.name()
            || self.namespace() != other.namespace()
        {
            return false;
        }
        match (self.uid(), other.uid()) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl From<Package> for InstalledPackage {
    fn from(pkg: Package) -> Self {
        InstalledPackage::Namespaced(pkg)
    }
}

impl From<ClusterPackage> for InstalledPackage {
    fn from(pkg: ClusterPackage) -> Self {
        InstalledPackage::Cluster(pkg)
    }
}

impl fmt::Display for InstalledPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{}/{}/{}", self.kind(), ns, self.name()),
            None => write!(f, "{}/{}", self.kind(), self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn cluster_package(version: &str) -> InstalledPackage {
        ClusterPackage::new(
            "nginx",
            ClusterPackageSpec {
                package_info: PackageInfoTemplate {
                    name: "nginx".to_string(),
                    version: version.to_string(),
                    repository_name: String::new(),
                },
                ..Default::default()
            },
        )
        .into()
    }

    #[test]
    fn test_accessors() {
        let mut pkg = cluster_package("v1.0.0");
        assert_eq!(pkg.kind(), PackageKind::ClusterPackage);
        assert_eq!(pkg.name(), "nginx");
        assert_eq!(pkg.namespace(), None);
        assert_eq!(pkg.desired_version(), "v1.0.0");

        pkg.set_desired_version("v1.1.0");
        assert_eq!(pkg.desired_version(), "v1.1.0");
        assert_eq!(pkg.to_string(), "ClusterPackage/nginx");
    }

    #[test]
    fn test_namespaced_display() {
        let mut pkg = Package::new(
            "cache",
            PackageSpec {
                package_info: PackageInfoTemplate {
                    name: "redis".to_string(),
                    version: "v7.0.0".to_string(),
                    repository_name: "community".to_string(),
                },
                ..Default::default()
            },
        );
        pkg.metadata.namespace = Some("apps".to_string());
        let pkg = InstalledPackage::from(pkg);

        assert_eq!(pkg.to_string(), "Package/apps/cache");
        assert_eq!(pkg.package_name(), "redis");
        assert_eq!(pkg.repository_name(), "community");
    }

    #[test]
    fn test_convergence_and_ready() {
        let mut pkg = cluster_package("v1.1.0");
        assert!(!pkg.is_converged());
        assert!(pkg.ready_condition().is_none());

        if let InstalledPackage::Cluster(inner) = &mut pkg {
            inner.status = Some(PackageStatus {
                version: "v1.1.0".to_string(),
                conditions: vec![Condition {
                    type_: CONDITION_READY.to_string(),
                    status: "True".to_string(),
                    reason: "InstallationSucceeded".to_string(),
                    message: String::new(),
                    last_transition_time: Time(chrono::Utc::now()),
                    observed_generation: None,
                }],
            });
        }

        assert!(pkg.is_converged());
        assert_eq!(pkg.ready_condition().unwrap().status, "True");
    }

    #[test]
    fn test_same_object() {
        let a = cluster_package("v1.0.0");
        let b = cluster_package("v2.0.0");
        assert!(a.is_same_object(&b));

        let mut c = cluster_package("v1.0.0");
        if let InstalledPackage::Cluster(inner) = &mut c {
            inner.metadata.uid = Some("uid-1".to_string());
        }
        let mut d = cluster_package("v1.0.0");
        if let InstalledPackage::Cluster(inner) = &mut d {
            inner.metadata.uid = Some("uid-2".to_string());
        }
        assert!(!c.is_same_object(&d));
    }
}
