//! Installed package access
//!
//! [`PackageClient`] is the seam between the update engine and the cluster.
//! [`KubePackageClient`] talks to the API server; it also serves as the
//! [`RepositorySource`] for a repository clientset, so one `kube::Client`
//! covers both.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams, Patch, PatchParams, WatchEvent, WatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use skiff_core::{ClusterPackage, InstalledPackage, Package, PackageKind, PackageRepository};
use skiff_repo::{RepoError, RepositorySource};
use std::fmt::Debug;
use tracing::debug;

use crate::error::{KubeError, Result};

/// Change to an installed package seen on a watch
#[derive(Debug, Clone)]
pub enum PackageEvent {
    Added(InstalledPackage),
    Modified(InstalledPackage),
    Deleted(InstalledPackage),
}

impl PackageEvent {
    pub fn package(&self) -> &InstalledPackage {
        match self {
            PackageEvent::Added(p) | PackageEvent::Modified(p) | PackageEvent::Deleted(p) => p,
        }
    }
}

/// Stream of watch events for a single package object
pub type PackageEventStream = BoxStream<'static, Result<PackageEvent>>;

/// Installed package operations
#[async_trait]
pub trait PackageClient: Send + Sync {
    async fn list_cluster_packages(&self) -> Result<Vec<ClusterPackage>>;

    /// List namespaced packages; `None` lists across all namespaces
    async fn list_packages(&self, namespace: Option<&str>) -> Result<Vec<Package>>;

    async fn get_cluster_package(&self, name: &str) -> Result<ClusterPackage>;

    async fn get_package(&self, namespace: &str, name: &str) -> Result<Package>;

    /// Persist a new desired version, touching nothing else in the spec
    async fn update_version(
        &self,
        pkg: &InstalledPackage,
        version: &str,
    ) -> Result<InstalledPackage>;

    /// Watch the object behind `pkg`
    async fn watch(&self, pkg: &InstalledPackage) -> Result<PackageEventStream>;
}

/// [`PackageClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubePackageClient {
    client: kube::Client,
}

impl KubePackageClient {
    /// Connect using the inferred kubeconfig or in-cluster environment
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(kube::Client::try_default().await?))
    }

    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    pub fn kube_client(&self) -> &kube::Client {
        &self.client
    }

    fn cluster_api(&self) -> Api<ClusterPackage> {
        Api::all(self.client.clone())
    }

    fn package_api(&self, namespace: Option<&str>) -> Api<Package> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

fn version_patch(version: &str) -> serde_json::Value {
    serde_json::json!({
        "spec": {
            "packageInfo": {
                "version": version,
            }
        }
    })
}

fn not_found(err: kube::Error, kind: PackageKind, name: &str, namespace: Option<&str>) -> KubeError {
    match err {
        kube::Error::Api(ref resp) if resp.code == 404 => KubeError::PackageNotFound {
            kind,
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        },
        other => KubeError::Api(other),
    }
}

async fn watch_object<K>(api: Api<K>, name: &str) -> Result<PackageEventStream>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    InstalledPackage: From<K>,
{
    let params = WatchParams::default().fields(&format!("metadata.name={}", name));
    let events = api.watch(&params, "0").await?;

    Ok(events
        .filter_map(|event| async move {
            match event {
                Ok(WatchEvent::Added(obj)) => Some(Ok(PackageEvent::Added(obj.into()))),
                Ok(WatchEvent::Modified(obj)) => Some(Ok(PackageEvent::Modified(obj.into()))),
                Ok(WatchEvent::Deleted(obj)) => Some(Ok(PackageEvent::Deleted(obj.into()))),
                Ok(WatchEvent::Bookmark(_)) => None,
                Ok(WatchEvent::Error(resp)) => Some(Err(KubeError::Api(kube::Error::Api(resp)))),
                Err(e) => Some(Err(KubeError::Api(e))),
            }
        })
        .boxed())
}

#[async_trait]
impl PackageClient for KubePackageClient {
    async fn list_cluster_packages(&self) -> Result<Vec<ClusterPackage>> {
        let list = self.cluster_api().list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn list_packages(&self, namespace: Option<&str>) -> Result<Vec<Package>> {
        let list = self
            .package_api(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn get_cluster_package(&self, name: &str) -> Result<ClusterPackage> {
        self.cluster_api()
            .get(name)
            .await
            .map_err(|e| not_found(e, PackageKind::ClusterPackage, name, None))
    }

    async fn get_package(&self, namespace: &str, name: &str) -> Result<Package> {
        self.package_api(Some(namespace))
            .get(name)
            .await
            .map_err(|e| not_found(e, PackageKind::Package, name, Some(namespace)))
    }

    async fn update_version(
        &self,
        pkg: &InstalledPackage,
        version: &str,
    ) -> Result<InstalledPackage> {
        let name = pkg.name();
        let patch = version_patch(version);
        let params = PatchParams::default();
        debug!(package = %pkg, version, "Patching desired version");

        match pkg {
            InstalledPackage::Cluster(_) => {
                let patched = self
                    .cluster_api()
                    .patch(&name, &params, &Patch::Merge(&patch))
                    .await
                    .map_err(|e| not_found(e, PackageKind::ClusterPackage, &name, None))?;
                Ok(patched.into())
            }
            InstalledPackage::Namespaced(p) => {
                let namespace = p.namespace().unwrap_or_default();
                let patched = self
                    .package_api(Some(&namespace))
                    .patch(&name, &params, &Patch::Merge(&patch))
                    .await
                    .map_err(|e| not_found(e, PackageKind::Package, &name, Some(&namespace)))?;
                Ok(patched.into())
            }
        }
    }

    async fn watch(&self, pkg: &InstalledPackage) -> Result<PackageEventStream> {
        let name = pkg.name();
        match pkg {
            InstalledPackage::Cluster(_) => watch_object(self.cluster_api(), &name).await,
            InstalledPackage::Namespaced(p) => {
                let namespace = p.namespace().unwrap_or_default();
                watch_object(self.package_api(Some(&namespace)), &name).await
            }
        }
    }
}

#[async_trait]
impl RepositorySource for KubePackageClient {
    async fn get_package_repository(&self, name: &str) -> skiff_repo::Result<PackageRepository> {
        let api: Api<PackageRepository> = Api::all(self.client.clone());
        api.get(name).await.map_err(|e| match e {
            kube::Error::Api(ref resp) if resp.code == 404 => RepoError::RepositoryNotFound {
                name: name.to_string(),
            },
            other => RepoError::from(other),
        })
    }

    async fn list_package_repositories(&self) -> skiff_repo::Result<Vec<PackageRepository>> {
        let api: Api<PackageRepository> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> skiff_repo::Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}
