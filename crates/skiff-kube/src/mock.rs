//! Mock package client for testing
//!
//! Keeps installed packages in memory, so selection and update logic can be
//! exercised without a Kubernetes cluster.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use kube::ResourceExt;
use kube::core::ErrorResponse;
use skiff_core::{ClusterPackage, InstalledPackage, Package, PackageKind, PackageStatus};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::client::{PackageClient, PackageEvent, PackageEventStream};
use crate::error::{KubeError, Result};

/// In-memory package client for testing
#[derive(Clone, Default)]
pub struct MockPackageClient {
    cluster_packages: Arc<RwLock<BTreeMap<String, ClusterPackage>>>,
    /// (namespace, name) -> package
    packages: Arc<RwLock<BTreeMap<(String, String), Package>>>,
    /// Scripted watch events, keyed by the package's display form
    watch_scripts: Arc<RwLock<HashMap<String, Vec<PackageEvent>>>>,
    failing_updates: Arc<RwLock<HashSet<String>>>,
    auto_converge: bool,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub updates: usize,
    pub watches: usize,
}

impl MockPackageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated packages
    pub fn with_packages(packages: Vec<InstalledPackage>) -> Self {
        let client = Self::new();
        for pkg in packages {
            client.put(pkg);
        }
        client
    }

    /// Report every update as installed right away.
    ///
    /// Updates then also write `status.version`, and watches without a
    /// script yield the stored object once.
    pub fn auto_converge(mut self) -> Self {
        self.auto_converge = true;
        self
    }

    pub fn put(&self, pkg: InstalledPackage) {
        match pkg {
            InstalledPackage::Cluster(p) => {
                self.cluster_packages
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(p.name_any(), p);
            }
            InstalledPackage::Namespaced(p) => {
                let key = (p.namespace().unwrap_or_default(), p.name_any());
                self.packages
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, p);
            }
        }
    }

    /// Current stored state of a package
    pub fn stored(&self, pkg: &InstalledPackage) -> Option<InstalledPackage> {
        match pkg {
            InstalledPackage::Cluster(p) => self
                .cluster_packages
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&p.name_any())
                .cloned()
                .map(InstalledPackage::from),
            InstalledPackage::Namespaced(p) => self
                .packages
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&(p.namespace().unwrap_or_default(), p.name_any()))
                .cloned()
                .map(InstalledPackage::from),
        }
    }

    /// Events the next watch on `pkg` will yield before closing
    pub fn script_watch(&self, pkg: &InstalledPackage, events: Vec<PackageEvent>) {
        self.watch_scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pkg.to_string(), events);
    }

    /// Make updates of the named object fail with a conflict
    pub fn fail_update(&self, name: &str) {
        self.failing_updates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        let mut ops = self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut *ops);
    }

    fn missing(pkg: &InstalledPackage) -> KubeError {
        KubeError::PackageNotFound {
            kind: pkg.kind(),
            name: pkg.name(),
            namespace: pkg.namespace(),
        }
    }
}

#[async_trait]
impl PackageClient for MockPackageClient {
    async fn list_cluster_packages(&self) -> Result<Vec<ClusterPackage>> {
        self.count(|ops| ops.lists += 1);
        let store = self
            .cluster_packages
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(store.values().cloned().collect())
    }

    async fn list_packages(&self, namespace: Option<&str>) -> Result<Vec<Package>> {
        self.count(|ops| ops.lists += 1);
        let store = self.packages.read().unwrap_or_else(PoisonError::into_inner);
        Ok(store
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn get_cluster_package(&self, name: &str) -> Result<ClusterPackage> {
        self.count(|ops| ops.gets += 1);
        let store = self
            .cluster_packages
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        store
            .get(name)
            .cloned()
            .ok_or_else(|| KubeError::PackageNotFound {
                kind: PackageKind::ClusterPackage,
                name: name.to_string(),
                namespace: None,
            })
    }

    async fn get_package(&self, namespace: &str, name: &str) -> Result<Package> {
        self.count(|ops| ops.gets += 1);
        let store = self.packages.read().unwrap_or_else(PoisonError::into_inner);
        store
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| KubeError::PackageNotFound {
                kind: PackageKind::Package,
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
            })
    }

    async fn update_version(
        &self,
        pkg: &InstalledPackage,
        version: &str,
    ) -> Result<InstalledPackage> {
        self.count(|ops| ops.updates += 1);

        let failing = self
            .failing_updates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&pkg.name());
        if failing {
            return Err(KubeError::Api(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: format!("the object {} has been modified", pkg),
                reason: "Conflict".to_string(),
                code: 409,
            })));
        }

        let mut updated = self.stored(pkg).ok_or_else(|| Self::missing(pkg))?;
        updated.set_desired_version(version);
        if self.auto_converge {
            let status = match &mut updated {
                InstalledPackage::Cluster(p) => p.status.get_or_insert_with(PackageStatus::default),
                InstalledPackage::Namespaced(p) => {
                    p.status.get_or_insert_with(PackageStatus::default)
                }
            };
            status.version = version.to_string();
        }

        self.put(updated.clone());
        Ok(updated)
    }

    async fn watch(&self, pkg: &InstalledPackage) -> Result<PackageEventStream> {
        self.count(|ops| ops.watches += 1);

        let scripted = self
            .watch_scripts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pkg.to_string());

        let events = match scripted {
            Some(events) => events,
            None if self.auto_converge => self
                .stored(pkg)
                .map(PackageEvent::Modified)
                .into_iter()
                .collect(),
            None => Vec::new(),
        };
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use skiff_core::{ClusterPackageSpec, PackageInfoTemplate, PackageSpec};

    fn nginx() -> InstalledPackage {
        ClusterPackage::new(
            "nginx",
            ClusterPackageSpec {
                package_info: PackageInfoTemplate {
                    name: "nginx".to_string(),
                    version: "v1.0.0+1".to_string(),
                    repository_name: String::new(),
                },
                ..Default::default()
            },
        )
        .into()
    }

    fn cache(namespace: &str) -> InstalledPackage {
        let mut pkg = Package::new(
            "cache",
            PackageSpec {
                package_info: PackageInfoTemplate {
                    name: "redis".to_string(),
                    version: "v7.0.0".to_string(),
                    repository_name: String::new(),
                },
                ..Default::default()
            },
        );
        pkg.metadata.namespace = Some(namespace.to_string());
        pkg.into()
    }

    #[tokio::test]
    async fn test_list_by_namespace() {
        let client = MockPackageClient::with_packages(vec![nginx(), cache("apps"), cache("web")]);

        assert_eq!(client.list_cluster_packages().await.unwrap().len(), 1);
        assert_eq!(client.list_packages(None).await.unwrap().len(), 2);
        assert_eq!(client.list_packages(Some("apps")).await.unwrap().len(), 1);
        assert!(client.list_packages(Some("other")).await.unwrap().is_empty());
        assert_eq!(client.operation_counts().lists, 4);
    }

    #[tokio::test]
    async fn test_get_missing_package() {
        let client = MockPackageClient::new();
        let err = client.get_package("apps", "cache").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_and_converge() {
        let client = MockPackageClient::with_packages(vec![nginx()]).auto_converge();

        let updated = client.update_version(&nginx(), "v1.0.0+2").await.unwrap();
        assert_eq!(updated.desired_version(), "v1.0.0+2");
        assert!(updated.is_converged());

        let events: Vec<PackageEvent> = client
            .watch(&nginx())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].package().is_converged());
    }

    #[tokio::test]
    async fn test_update_failure() {
        let client = MockPackageClient::with_packages(vec![nginx()]);
        client.fail_update("nginx");

        let err = client.update_version(&nginx(), "v1.0.0+2").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(client.stored(&nginx()).unwrap().desired_version(), "v1.0.0+1");
    }
}
