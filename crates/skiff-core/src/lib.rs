//! Skiff Core - Shared types for the Kubernetes package manager
//!
//! This crate provides the foundational types used throughout Skiff:
//! - `PackageRepository`: A named source of package indices and manifests
//! - `Package` / `ClusterPackage`: Installed packages, unified by `InstalledPackage`
//! - `PackageManifest`: The installable descriptor a repository publishes
//! - `version`: Upgrade ordering with build-metadata tie-breaking

pub mod error;
pub mod manifest;
pub mod package;
pub mod repository;
pub mod version;

pub use error::{CoreError, Result};
pub use manifest::{Dependency, PackageManifest, PackageScope};
pub use package::{
    ClusterPackage, ClusterPackageSpec, InstalledPackage, Package, PackageInfoTemplate,
    PackageKind, PackageSpec, PackageStatus,
};
pub use repository::{
    DEFAULT_REPOSITORY_ANNOTATION, PackageRepository, PackageRepositorySpec, RepositoryAuthSpec,
    SecretKeyRef,
};
pub use version::{is_upgradable, max_version, parse_version, validate_constraint};
