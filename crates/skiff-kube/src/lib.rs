//! Skiff Kube - cluster side of package updates
//!
//! This crate provides:
//! - **Package Client**: list, get, patch and watch installed `Package` and
//!   `ClusterPackage` objects
//! - **Target Selection**: which installed packages an update is about
//! - **Dependency Validation**: conflicts and requirements of a manifest
//! - **Update Transactions**: compute target versions from repository
//!   catalogs, then apply them, optionally waiting for the operator to
//!   confirm each one
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skiff_kube::{ClusterDependencyValidator, KubePackageClient, PackageSelection, Updater};
//! use skiff_repo::{ClientsetConfig, RepoClientset};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(KubePackageClient::try_default().await?);
//! let repos = Arc::new(RepoClientset::new(client.clone(), ClientsetConfig::load()?));
//! let validator = Arc::new(ClusterDependencyValidator::new(client.clone(), repos.clone()));
//! let updater = Updater::new(client, repos, validator);
//!
//! let tx = updater
//!     .prepare(&[PackageSelection::all_cluster_packages()])
//!     .await?;
//! if !tx.is_empty() {
//!     updater.apply_blocking(&tx).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dependency;
pub mod error;
pub mod mock;
pub mod selection;
pub mod update;

pub use client::{KubePackageClient, PackageClient, PackageEvent, PackageEventStream};
pub use dependency::{
    ClusterDependencyValidator, Conflict, DependencyValidator, PackageWithVersion, Requirement,
    ValidationResult, ValidationStatus,
};
pub use error::{KubeError, Result};
pub use mock::{MockPackageClient, OperationCounts};
pub use selection::{NamespacedName, PackageSelection};
pub use update::{ConflictItem, UpdateItem, UpdateTransaction, Updater};
