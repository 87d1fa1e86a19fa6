//! Repository clients
//!
//! A repository publishes three kinds of documents under its base URL:
//! - `index.yaml`: the catalog, cached per client for `max_cache_age`
//! - `{name}/versions.yaml`: versions of one package
//! - `{name}/{version}/package.yaml`: a package manifest
//!
//! [`DeferredErrorClient`] stands in for a client that could not be built and
//! returns the construction error from every call.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use skiff_core::PackageManifest;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use url::Url;

use crate::auth::Authenticator;
use crate::error::{RepoError, Result};
use crate::index::{PackageIndex, PackageRepoIndex, decode_document};

const MEDIA_TYPE_JSON: &str = "application/json";
const MEDIA_TYPE_YAML: &str = "application/yaml";

/// Media types a repository may serve its documents with
const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    MEDIA_TYPE_JSON,
    MEDIA_TYPE_YAML,
    "application/x-yaml",
    "application/octet-stream",
    "text/yaml",
    "text/x-yaml",
    "text/plain",
];

/// Operations on a single repository
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Fetch the repository catalog
    async fn fetch_package_repo_index(&self) -> Result<PackageRepoIndex>;

    /// Fetch the version index of a package.
    ///
    /// A 404 means the package has no version index; check with
    /// [`RepoError::is_not_found`] instead of treating it as fatal.
    async fn fetch_package_index(&self, name: &str) -> Result<PackageIndex>;

    async fn fetch_package_manifest(&self, name: &str, version: &str) -> Result<PackageManifest>;

    /// Fetch the manifest of the latest version, returning that version too.
    ///
    /// Without a version index the versionless manifest is used and the
    /// returned version is empty.
    async fn fetch_latest_package_manifest(&self, name: &str)
    -> Result<(String, PackageManifest)>;

    /// Latest version advertised in the catalog, empty if the package is not listed
    async fn get_latest_version(&self, name: &str) -> Result<String>;

    fn get_package_manifest_url(&self, name: &str, version: &str) -> Result<String>;
}

struct CachedIndex {
    index: PackageRepoIndex,
    fetched_at: Instant,
}

/// HTTP(S) repository client
pub struct HttpRepoClient {
    base_url: String,
    auth: Authenticator,
    http: reqwest::Client,
    max_cache_age: Duration,
    cache: RwLock<Option<CachedIndex>>,
    /// Serializes catalog refreshes
    refresh_lock: Mutex<()>,
}

impl HttpRepoClient {
    /// Create a client for the repository at `url`
    pub fn new(url: &str, auth: Authenticator, max_cache_age: Duration) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| RepoError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RepoError::InvalidUrl {
                url: url.to_string(),
                reason: "URL must start with http:// or https://".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("skiff/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            auth,
            http,
            max_cache_age,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Drop the cached catalog
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    fn url_for(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    fn repo_index_url(&self) -> String {
        self.url_for(&["index.yaml"])
    }

    fn package_index_url(&self, name: &str) -> String {
        self.url_for(&[name, "versions.yaml"])
    }

    fn versionless_manifest_url(&self, name: &str) -> String {
        self.url_for(&[name, "package.yaml"])
    }

    async fn fresh_index(&self) -> Option<PackageRepoIndex> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.max_cache_age)
            .map(|c| c.index.clone())
    }

    async fn cached_repo_index(&self) -> Result<PackageRepoIndex> {
        if let Some(index) = self.fresh_index().await {
            debug!(url = %self.base_url, "Catalog cache hit");
            return Ok(index);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited
        if let Some(index) = self.fresh_index().await {
            debug!(url = %self.base_url, "Catalog cache hit after lock");
            return Ok(index);
        }

        debug!(url = %self.base_url, "Catalog cache miss");
        let index: PackageRepoIndex = self.fetch(&self.repo_index_url()).await?;
        *self.cache.write().await = Some(CachedIndex {
            index: index.clone(),
            fetched_at: Instant::now(),
        });
        Ok(index)
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "Fetching repository document");

        let request = self
            .http
            .get(url)
            .header(ACCEPT, MEDIA_TYPE_JSON)
            .header(ACCEPT, MEDIA_TYPE_YAML);
        let response = self
            .auth
            .apply(request)
            .send()
            .await
            .map_err(|e| RepoError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::Status {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }

        check_media_type(url, response.headers())?;

        let body = response.bytes().await.map_err(|e| RepoError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        decode_document(url, &body)
    }
}

fn check_media_type(url: &str, headers: &HeaderMap) -> Result<()> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(());
    };
    let Ok(raw) = value.to_str() else {
        return Err(RepoError::UnacceptableMediaType {
            url: url.to_string(),
            media_type: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        });
    };
    let media_type = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

    if media_type.is_empty() || ACCEPTED_MEDIA_TYPES.contains(&media_type.as_str()) {
        Ok(())
    } else {
        Err(RepoError::UnacceptableMediaType {
            url: url.to_string(),
            media_type,
        })
    }
}

#[async_trait]
impl RepoClient for HttpRepoClient {
    async fn fetch_package_repo_index(&self) -> Result<PackageRepoIndex> {
        self.cached_repo_index().await
    }

    async fn fetch_package_index(&self, name: &str) -> Result<PackageIndex> {
        self.fetch(&self.package_index_url(name)).await
    }

    async fn fetch_package_manifest(&self, name: &str, version: &str) -> Result<PackageManifest> {
        let url = self.get_package_manifest_url(name, version)?;
        self.fetch(&url).await
    }

    async fn fetch_latest_package_manifest(
        &self,
        name: &str,
    ) -> Result<(String, PackageManifest)> {
        match self.fetch_package_index(name).await {
            Ok(index) => {
                let manifest = self
                    .fetch_package_manifest(name, &index.latest_version)
                    .await?;
                Ok((index.latest_version, manifest))
            }
            Err(e) if e.is_not_found() => {
                debug!(package = name, "No version index, using versionless manifest");
                let manifest = self.fetch(&self.versionless_manifest_url(name)).await?;
                Ok((String::new(), manifest))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_latest_version(&self, name: &str) -> Result<String> {
        let index = self.cached_repo_index().await?;
        Ok(index
            .get(name)
            .map(|item| item.latest_version.clone())
            .unwrap_or_default())
    }

    fn get_package_manifest_url(&self, name: &str, version: &str) -> Result<String> {
        Ok(self.url_for(&[name, version, "package.yaml"]))
    }
}

/// Client whose every call fails with the error that prevented building a real one
#[derive(Debug, Clone)]
pub struct DeferredErrorClient {
    error: RepoError,
}

impl DeferredErrorClient {
    pub fn new(error: RepoError) -> Self {
        Self { error }
    }

    pub fn error(&self) -> &RepoError {
        &self.error
    }
}

#[async_trait]
impl RepoClient for DeferredErrorClient {
    async fn fetch_package_repo_index(&self) -> Result<PackageRepoIndex> {
        Err(self.error.clone())
    }

    async fn fetch_package_index(&self, _name: &str) -> Result<PackageIndex> {
        Err(self.error.clone())
    }

    async fn fetch_package_manifest(
        &self,
        _name: &str,
        _version: &str,
    ) -> Result<PackageManifest> {
        Err(self.error.clone())
    }

    async fn fetch_latest_package_manifest(
        &self,
        _name: &str,
    ) -> Result<(String, PackageManifest)> {
        Err(self.error.clone())
    }

    async fn get_latest_version(&self, _name: &str) -> Result<String> {
        Err(self.error.clone())
    }

    fn get_package_manifest_url(&self, _name: &str, _version: &str) -> Result<String> {
        Err(self.error.clone())
    }
}
