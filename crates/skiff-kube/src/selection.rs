//! Update target selection
//!
//! A [`PackageSelection`] says which installed packages an update is about.
//! Selections that name their targets are *explicit*: every name must
//! resolve, and up-to-date packages are still reported.

use futures::future::try_join_all;
use skiff_core::InstalledPackage;
use std::fmt;

use crate::client::PackageClient;
use crate::error::Result;

/// Namespace and name of a namespaced package
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub enum PackageSelection {
    /// Packages already fetched by the caller
    Exact(Vec<InstalledPackage>),
    AllClusterPackages,
    /// All namespaced packages, in one namespace or across all of them
    AllPackages { namespace: Option<String> },
    ClusterPackagesNamed(Vec<String>),
    PackagesNamed(Vec<NamespacedName>),
}

impl PackageSelection {
    pub fn exact(packages: Vec<InstalledPackage>) -> Self {
        Self::Exact(packages)
    }

    pub fn all_cluster_packages() -> Self {
        Self::AllClusterPackages
    }

    /// All namespaced packages; an empty namespace means every namespace
    pub fn all_packages(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self::AllPackages {
            namespace: (!namespace.is_empty()).then_some(namespace),
        }
    }

    pub fn cluster_packages_with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ClusterPackagesNamed(names.into_iter().map(Into::into).collect())
    }

    pub fn cluster_package_with_name(name: impl Into<String>) -> Self {
        Self::ClusterPackagesNamed(vec![name.into()])
    }

    pub fn packages_with_names(names: Vec<NamespacedName>) -> Self {
        Self::PackagesNamed(names)
    }

    pub fn package_with_name(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::PackagesNamed(vec![NamespacedName::new(namespace, name)])
    }

    /// Whether the caller named the targets
    pub fn explicit(&self) -> bool {
        matches!(
            self,
            Self::Exact(_) | Self::ClusterPackagesNamed(_) | Self::PackagesNamed(_)
        )
    }

    /// Resolve the selection against the cluster.
    ///
    /// Named lookups keep the requested order and fail if any name is missing.
    pub async fn get(&self, client: &dyn PackageClient) -> Result<Vec<InstalledPackage>> {
        match self {
            Self::Exact(packages) => Ok(packages.clone()),
            Self::AllClusterPackages => Ok(client
                .list_cluster_packages()
                .await?
                .into_iter()
                .map(InstalledPackage::from)
                .collect()),
            Self::AllPackages { namespace } => Ok(client
                .list_packages(namespace.as_deref())
                .await?
                .into_iter()
                .map(InstalledPackage::from)
                .collect()),
            Self::ClusterPackagesNamed(names) => {
                try_join_all(names.iter().map(|name| async move {
                    client
                        .get_cluster_package(name)
                        .await
                        .map(InstalledPackage::from)
                }))
                .await
            }
            Self::PackagesNamed(names) => {
                try_join_all(names.iter().map(|n| async move {
                    client
                        .get_package(&n.namespace, &n.name)
                        .await
                        .map(InstalledPackage::from)
                }))
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPackageClient;
    use skiff_core::{
        ClusterPackage, ClusterPackageSpec, Package, PackageInfoTemplate, PackageSpec,
    };

    fn cluster(name: &str) -> InstalledPackage {
        ClusterPackage::new(
            name,
            ClusterPackageSpec {
                package_info: PackageInfoTemplate {
                    name: name.to_string(),
                    version: "v1.0.0".to_string(),
                    repository_name: String::new(),
                },
                ..Default::default()
            },
        )
        .into()
    }

    fn namespaced(namespace: &str, name: &str) -> InstalledPackage {
        let mut pkg = Package::new(
            name,
            PackageSpec {
                package_info: PackageInfoTemplate {
                    name: name.to_string(),
                    version: "v1.0.0".to_string(),
                    repository_name: String::new(),
                },
                ..Default::default()
            },
        );
        pkg.metadata.namespace = Some(namespace.to_string());
        pkg.into()
    }

    fn client() -> MockPackageClient {
        MockPackageClient::with_packages(vec![
            cluster("argo-cd"),
            cluster("nginx"),
            namespaced("apps", "cache"),
            namespaced("apps", "queue"),
            namespaced("web", "cache"),
        ])
    }

    fn names(packages: &[InstalledPackage]) -> Vec<String> {
        packages.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_explicit() {
        assert!(PackageSelection::exact(vec![]).explicit());
        assert!(PackageSelection::cluster_package_with_name("nginx").explicit());
        assert!(PackageSelection::package_with_name("apps", "cache").explicit());
        assert!(!PackageSelection::all_cluster_packages().explicit());
        assert!(!PackageSelection::all_packages("").explicit());
    }

    #[tokio::test]
    async fn test_all_packages_by_namespace() {
        let client = client();

        let all = PackageSelection::all_packages("").get(&client).await.unwrap();
        assert_eq!(all.len(), 3);

        let apps = PackageSelection::all_packages("apps").get(&client).await.unwrap();
        assert_eq!(
            names(&apps),
            vec!["Package/apps/cache".to_string(), "Package/apps/queue".to_string()]
        );

        let cluster = PackageSelection::all_cluster_packages().get(&client).await.unwrap();
        assert_eq!(cluster.len(), 2);
    }

    #[tokio::test]
    async fn test_packages_with_names_keeps_requested_names() {
        let client = client();
        let selection = PackageSelection::packages_with_names(vec![
            NamespacedName::new("web", "cache"),
            NamespacedName::new("apps", "queue"),
        ]);

        let selected = selection.get(&client).await.unwrap();
        assert_eq!(
            names(&selected),
            vec!["Package/web/cache".to_string(), "Package/apps/queue".to_string()]
        );
    }

    #[tokio::test]
    async fn test_named_lookup_fails_on_missing() {
        let client = client();

        let err = PackageSelection::cluster_packages_with_names(["nginx", "missing"])
            .get(&client)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = PackageSelection::package_with_name("web", "queue")
            .get(&client)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
