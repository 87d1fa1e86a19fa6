//! Cluster lookups needed to build repository clients
//!
//! The clientset reads `PackageRepository` objects and auth `Secret`s through
//! [`RepositorySource`]. The kube-backed implementation lives in `skiff-kube`;
//! [`MockRepositorySource`] keeps everything in memory for tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use skiff_core::PackageRepository;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::{RepoError, Result};

/// Read access to repositories and secrets in the cluster
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Get a repository by name
    async fn get_package_repository(&self, name: &str) -> Result<PackageRepository>;

    /// List all repositories
    async fn list_package_repositories(&self) -> Result<Vec<PackageRepository>>;

    /// Get a secret by name
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Secret>;
}

/// In-memory repository source for testing
#[derive(Clone, Default)]
pub struct MockRepositorySource {
    repositories: Arc<RwLock<HashMap<String, PackageRepository>>>,
    /// namespace -> name -> secret
    secrets: Arc<RwLock<HashMap<String, HashMap<String, Secret>>>>,
    /// Latency added to every secret lookup
    secret_delay: Arc<RwLock<Duration>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub repository_gets: usize,
    pub repository_lists: usize,
    pub secret_gets: usize,
}

impl MockRepositorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated repositories
    pub fn with_repositories(repos: Vec<PackageRepository>) -> Self {
        let source = Self::new();
        for repo in repos {
            source.put_repository(repo);
        }
        source
    }

    /// Insert or replace a repository
    pub fn put_repository(&self, repo: PackageRepository) {
        let mut repos = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        repos.insert(repo.name_any(), repo);
    }

    pub fn remove_repository(&self, name: &str) {
        let mut repos = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        repos.remove(name);
    }

    pub fn put_secret(&self, secret: Secret) {
        let namespace = secret.namespace().unwrap_or_default();
        let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        secrets
            .entry(namespace)
            .or_default()
            .insert(secret.name_any(), secret);
    }

    /// Make every secret lookup take at least `delay`
    pub fn set_secret_delay(&self, delay: Duration) {
        *self
            .secret_delay
            .write()
            .unwrap_or_else(PoisonError::into_inner) = delay;
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
}

#[async_trait]
impl RepositorySource for MockRepositorySource {
    async fn get_package_repository(&self, name: &str) -> Result<PackageRepository> {
        self.count(|ops| ops.repository_gets += 1);

        let repos = self
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        repos
            .get(name)
            .cloned()
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })
    }

    async fn list_package_repositories(&self) -> Result<Vec<PackageRepository>> {
        self.count(|ops| ops.repository_lists += 1);

        let repos = self
            .repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(repos.values().cloned().collect())
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Secret> {
        self.count(|ops| ops.secret_gets += 1);

        let delay = *self
            .secret_delay
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        secrets
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned()
            .ok_or_else(|| RepoError::Cluster {
                message: format!("secret {}/{} not found", namespace, name),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_core::PackageRepositorySpec;

    #[tokio::test]
    async fn test_mock_source_roundtrip() {
        let source = MockRepositorySource::with_repositories(vec![PackageRepository::new(
            "main",
            PackageRepositorySpec {
                url: "https://packages.example.com".to_string(),
                auth: None,
            },
        )]);

        let repo = source.get_package_repository("main").await.unwrap();
        assert_eq!(repo.spec.url, "https://packages.example.com");
        assert!(matches!(
            source.get_package_repository("other").await,
            Err(RepoError::RepositoryNotFound { .. })
        ));

        source.remove_repository("main");
        assert!(source.list_package_repositories().await.unwrap().is_empty());

        let counts = source.operation_counts();
        assert_eq!(counts.repository_gets, 2);
        assert_eq!(counts.repository_lists, 1);
    }
}
