//! Skiff Repository Clients
//!
//! This crate fetches package catalogs, version indices and manifests from
//! `PackageRepository` sources:
//!
//! - **RepoClient**: one repository over HTTP(S), with a TTL-cached catalog
//! - **RepoClientset**: one client per repository, rebuilt only when the
//!   repository spec changes
//! - **RepoAggregator**: all repositories merged into a single catalog
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skiff_repo::{ClientsetConfig, MockRepositorySource, RepoClientset};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(MockRepositorySource::new());
//! let clientset = RepoClientset::new(source, ClientsetConfig::load()?);
//!
//! // Lookups never fail; errors surface when the client is used
//! let latest = clientset.default().await.get_latest_version("nginx").await?;
//!
//! // Catalog merged across repositories
//! let meta = clientset.aggregate().fetch_meta_index().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod clientset;
pub mod config;
pub mod error;
pub mod index;
pub mod meta;
pub mod source;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::{DeferredErrorClient, HttpRepoClient, RepoClient};
pub use clientset::RepoClientset;
pub use config::ClientsetConfig;
pub use error::{PartialResult, RepoError, Result};
pub use index::{MetaIndex, MetaIndexItem, PackageIndex, PackageRepoIndex, PackageRepoIndexItem};
pub use meta::RepoAggregator;
pub use source::{MockRepositorySource, RepositorySource};
