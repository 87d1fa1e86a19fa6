//! Per-repository client cache
//!
//! Lookups never fail: when a client cannot be built, a [`DeferredErrorClient`]
//! is returned so the error surfaces on first use.
//!
//! Two locks are involved. `name_lock` serializes by-name repository lookups
//! against the cluster, `clients` guards the cache entries and spec
//! comparisons. Clients are built with neither cache lock held, so a slow
//! repository lookup or secret read does not hold up other repositories.

use kube::ResourceExt;
use skiff_core::{InstalledPackage, PackageRepository, PackageRepositorySpec};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::client::{DeferredErrorClient, HttpRepoClient, RepoClient};
use crate::config::ClientsetConfig;
use crate::error::{RepoError, Result};
use crate::meta::RepoAggregator;
use crate::source::RepositorySource;

struct CacheEntry {
    client: Arc<dyn RepoClient>,
    /// Spec the client was built from
    spec: PackageRepositorySpec,
    last_checked: Instant,
}

/// Owns one [`RepoClient`] per repository
pub struct RepoClientset {
    source: Arc<dyn RepositorySource>,
    config: ClientsetConfig,
    name_lock: Mutex<()>,
    clients: Mutex<HashMap<String, CacheEntry>>,
}

impl RepoClientset {
    pub fn new(source: Arc<dyn RepositorySource>, config: ClientsetConfig) -> Self {
        Self {
            source,
            config,
            name_lock: Mutex::new(()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(source: Arc<dyn RepositorySource>) -> Self {
        Self::new(source, ClientsetConfig::default())
    }

    pub fn config(&self) -> &ClientsetConfig {
        &self.config
    }

    pub(crate) fn source(&self) -> &dyn RepositorySource {
        self.source.as_ref()
    }

    /// Client for the repository a package was installed from
    pub async fn for_package(&self, pkg: &InstalledPackage) -> Arc<dyn RepoClient> {
        self.for_repo_with_name(pkg.repository_name()).await
    }

    /// Client for a repository by name; an empty name means the default repository
    pub async fn for_repo_with_name(&self, name: &str) -> Arc<dyn RepoClient> {
        if name.is_empty() {
            return self.default().await;
        }

        if let Some(client) = self.recently_checked(name).await {
            return client;
        }

        let _guard = self.name_lock.lock().await;
        if let Some(client) = self.recently_checked(name).await {
            return client;
        }

        match self.source.get_package_repository(name).await {
            Ok(repo) => self.for_repo(&repo).await,
            Err(e) => {
                debug!(repository = name, error = %e, "Repository lookup failed");
                Arc::new(DeferredErrorClient::new(e))
            }
        }
    }

    /// Client for a repository object, rebuilt only when its spec changed.
    ///
    /// The cache lock is not held while a client is built, since building may
    /// read auth secrets from the cluster.
    pub async fn for_repo(&self, repo: &PackageRepository) -> Arc<dyn RepoClient> {
        let name = repo.name_any();
        if let Some(client) = self.cached_for_spec(&name, &repo.spec).await {
            return client;
        }

        let built = self.build_client(repo).await;

        let mut clients = self.clients.lock().await;
        // A concurrent call may have built a client for the same spec meanwhile
        if let Some(entry) = clients.get_mut(&name)
            && entry.spec == repo.spec
        {
            entry.last_checked = Instant::now();
            return entry.client.clone();
        }

        match built {
            Ok(client) => {
                info!(repository = %name, url = %repo.spec.url, "Built repository client");
                let client: Arc<dyn RepoClient> = Arc::new(client);
                clients.insert(
                    name,
                    CacheEntry {
                        client: client.clone(),
                        spec: repo.spec.clone(),
                        last_checked: Instant::now(),
                    },
                );
                client
            }
            Err(e) => {
                warn!(repository = %name, error = %e, "Could not build repository client");
                clients.remove(&name);
                Arc::new(DeferredErrorClient::new(e))
            }
        }
    }

    /// Client for the repository marked as default
    pub async fn default(&self) -> Arc<dyn RepoClient> {
        match self.default_repository().await {
            Ok(repo) => self.for_repo(&repo).await,
            Err(e) => Arc::new(DeferredErrorClient::new(e)),
        }
    }

    /// The single repository marked as default
    pub async fn default_repository(&self) -> Result<PackageRepository> {
        let repos = self.source.list_package_repositories().await?;
        let mut defaults: Vec<PackageRepository> =
            repos.into_iter().filter(|r| r.is_default()).collect();

        match defaults.len() {
            0 => Err(RepoError::DefaultRepositoryNotFound),
            1 => Ok(defaults.remove(0)),
            _ => {
                let mut names: Vec<String> = defaults.iter().map(|r| r.name_any()).collect();
                names.sort();
                Err(RepoError::MultipleDefaultRepositories { names })
            }
        }
    }

    /// Cross-repository view
    pub fn aggregate(&self) -> RepoAggregator<'_> {
        RepoAggregator::new(self)
    }

    async fn cached_for_spec(
        &self,
        name: &str,
        spec: &PackageRepositorySpec,
    ) -> Option<Arc<dyn RepoClient>> {
        let mut clients = self.clients.lock().await;
        let entry = clients.get_mut(name).filter(|entry| entry.spec == *spec)?;
        entry.last_checked = Instant::now();
        Some(entry.client.clone())
    }

    async fn recently_checked(&self, name: &str) -> Option<Arc<dyn RepoClient>> {
        let clients = self.clients.lock().await;
        clients
            .get(name)
            .filter(|entry| entry.last_checked.elapsed() < self.config.client_check_interval)
            .map(|entry| entry.client.clone())
    }

    async fn build_client(&self, repo: &PackageRepository) -> Result<HttpRepoClient> {
        let auth =
            Authenticator::resolve(repo, self.source.as_ref(), &self.config.secret_namespace)
                .await?;
        HttpRepoClient::new(&repo.spec.url, auth, self.config.max_cache_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockRepositorySource;
    use k8s_openapi::ByteString;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;
    use skiff_core::repository::BearerAuthSpec;
    use skiff_core::{
        ClusterPackage, ClusterPackageSpec, PackageInfoTemplate, RepositoryAuthSpec, SecretKeyRef,
    };
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn repo(name: &str, url: &str, default: bool) -> PackageRepository {
        let mut repo = PackageRepository::new(
            name,
            PackageRepositorySpec {
                url: url.to_string(),
                auth: None,
            },
        );
        repo.set_default(default);
        repo
    }

    fn clientset(source: &MockRepositorySource) -> RepoClientset {
        RepoClientset::with_defaults(Arc::new(source.clone()))
    }

    #[tokio::test]
    async fn test_for_repo_reuses_client() {
        let source = MockRepositorySource::new();
        let clientset = clientset(&source);
        let main = repo("main", "https://packages.example.com", true);

        let first = clientset.for_repo(&main).await;
        let second = clientset.for_repo(&main).await;
        assert!(Arc::ptr_eq(&first, &second));

        let mut moved = main.clone();
        moved.spec.url = "https://mirror.example.com".to_string();
        let third = clientset.for_repo(&moved).await;
        assert!(!Arc::ptr_eq(&second, &third));
    }

    #[tokio::test]
    async fn test_for_repo_with_name_within_check_interval() {
        let source =
            MockRepositorySource::with_repositories(vec![repo("main", "https://a.example.com", false)]);
        let clientset = clientset(&source);

        let first = clientset.for_repo_with_name("main").await;
        let second = clientset.for_repo_with_name("main").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.operation_counts().repository_gets, 1);
    }

    #[tokio::test]
    async fn test_for_repo_with_name_rechecks_spec() {
        let source =
            MockRepositorySource::with_repositories(vec![repo("main", "https://a.example.com", false)]);
        let clientset = RepoClientset::new(
            Arc::new(source.clone()),
            ClientsetConfig::default().with_client_check_interval(Duration::ZERO),
        );

        let first = clientset.for_repo_with_name("main").await;
        let unchanged = clientset.for_repo_with_name("main").await;
        assert!(Arc::ptr_eq(&first, &unchanged));
        assert_eq!(source.operation_counts().repository_gets, 2);

        source.put_repository(repo("main", "https://b.example.com", false));
        let changed = clientset.for_repo_with_name("main").await;
        assert!(!Arc::ptr_eq(&first, &changed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_auth_does_not_block_cached_clients() {
        let source =
            MockRepositorySource::with_repositories(vec![repo("main", "https://a.example.com", false)]);
        source.put_secret(Secret {
            metadata: ObjectMeta {
                name: Some("registry-token".to_string()),
                namespace: Some("skiff-system".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "token".to_string(),
                ByteString(b"t0ken".to_vec()),
            )])),
            ..Default::default()
        });
        source.set_secret_delay(Duration::from_secs(2));
        let clientset = Arc::new(clientset(&source));

        let main = clientset.for_repo_with_name("main").await;

        let mut private = repo("private", "https://private.example.com", false);
        private.spec.auth = Some(RepositoryAuthSpec {
            basic: None,
            bearer: Some(BearerAuthSpec {
                token: None,
                token_secret_ref: Some(SecretKeyRef {
                    name: "registry-token".to_string(),
                    key: "token".to_string(),
                }),
            }),
        });
        let building = {
            let clientset = clientset.clone();
            let private = private.clone();
            tokio::spawn(async move { clientset.for_repo(&private).await })
        };
        // Let the build reach the secret lookup
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        let again = clientset.for_repo_with_name("main").await;
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(Arc::ptr_eq(&main, &again));

        let private_client = building.await.unwrap();
        assert_eq!(source.operation_counts().secret_gets, 1);
        let cached = clientset.for_repo(&private).await;
        assert!(Arc::ptr_eq(&private_client, &cached));
    }

    #[tokio::test]
    async fn test_missing_repository_defers_error() {
        let source = MockRepositorySource::new();
        let clientset = clientset(&source);

        let client = clientset.for_repo_with_name("missing").await;
        match client.fetch_package_repo_index().await {
            Err(RepoError::RepositoryNotFound { name }) => assert_eq!(name, "missing"),
            other => panic!("Expected deferred lookup error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_auth_defers_error() {
        let source = MockRepositorySource::new();
        let clientset = clientset(&source);
        let mut private = repo("private", "https://private.example.com", false);
        private.spec.auth = Some(RepositoryAuthSpec {
            basic: None,
            bearer: Some(BearerAuthSpec {
                token: None,
                token_secret_ref: Some(SecretKeyRef {
                    name: "absent".to_string(),
                    key: "token".to_string(),
                }),
            }),
        });

        let client = clientset.for_repo(&private).await;
        assert!(matches!(
            client.get_latest_version("nginx").await,
            Err(RepoError::AuthConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_default_repository() {
        let source = MockRepositorySource::with_repositories(vec![
            repo("community", "https://community.example.com", false),
            repo("main", "https://main.example.com", true),
        ]);
        let clientset = clientset(&source);

        let by_empty_name = clientset.for_repo_with_name("").await;
        let by_name = clientset.for_repo(&source.get_package_repository("main").await.unwrap()).await;
        assert!(Arc::ptr_eq(&by_empty_name, &by_name));

        let pkg = InstalledPackage::from(ClusterPackage::new(
            "nginx",
            ClusterPackageSpec {
                package_info: PackageInfoTemplate {
                    name: "nginx".to_string(),
                    version: "v1.0.0".to_string(),
                    repository_name: String::new(),
                },
                ..Default::default()
            },
        ));
        let for_package = clientset.for_package(&pkg).await;
        assert!(Arc::ptr_eq(&for_package, &by_name));
    }

    #[tokio::test]
    async fn test_default_repository_missing_or_ambiguous() {
        let source = MockRepositorySource::with_repositories(vec![repo(
            "community",
            "https://community.example.com",
            false,
        )]);
        let clientset = clientset(&source);
        assert!(matches!(
            clientset.default().await.fetch_package_repo_index().await,
            Err(RepoError::DefaultRepositoryNotFound)
        ));

        source.put_repository(repo("b", "https://b.example.com", true));
        source.put_repository(repo("a", "https://a.example.com", true));
        match clientset.default().await.fetch_package_repo_index().await {
            Err(RepoError::MultipleDefaultRepositories { names }) => {
                assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("Expected ambiguity error, got {:?}", other),
        }
    }
}
