//! Dependency validation
//!
//! The update engine only consumes the outcome of a validation: whether the
//! manifest conflicts with what is installed, and which additional packages it
//! requires. [`DependencyValidator`] is that contract;
//! [`ClusterDependencyValidator`] is the implementation backed by the
//! installed cluster packages and the default repository.

use async_trait::async_trait;
use skiff_core::{Dependency, InstalledPackage, PackageManifest, max_version, validate_constraint};
use skiff_repo::{RepoClient, RepoClientset};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::client::PackageClient;
use crate::error::Result;

/// Overall outcome of a validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Every dependency is installed in a suitable version
    #[default]
    Ok,
    /// Missing dependencies can be installed
    Resolvable,
    /// At least one installed dependency is incompatible
    Conflict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PackageWithVersion {
    pub name: String,
    pub version: String,
}

impl PackageWithVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A package that has to be installed alongside the validated one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub package: PackageWithVersion,
    /// Required by a dependency rather than by the validated package itself
    pub transitive: bool,
}

/// An installed package that does not satisfy a declared dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub actual: PackageWithVersion,
    pub required: PackageWithVersion,
    pub cause: Option<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (required: {}, actual: {})",
            self.required.name, self.required.version, self.actual.version
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub requirements: Vec<Requirement>,
    pub conflicts: Vec<Conflict>,
}

impl ValidationResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    fn with_status(mut self) -> Self {
        self.status = if !self.conflicts.is_empty() {
            ValidationStatus::Conflict
        } else if !self.requirements.is_empty() {
            ValidationStatus::Resolvable
        } else {
            ValidationStatus::Ok
        };
        self
    }
}

/// Checks a manifest's dependencies against the cluster
#[async_trait]
pub trait DependencyValidator: Send + Sync {
    async fn validate(&self, manifest: &PackageManifest, version: &str)
    -> Result<ValidationResult>;
}

/// Validator backed by installed cluster packages and the default repository
pub struct ClusterDependencyValidator {
    client: Arc<dyn PackageClient>,
    repos: Arc<RepoClientset>,
}

impl ClusterDependencyValidator {
    pub fn new(client: Arc<dyn PackageClient>, repos: Arc<RepoClientset>) -> Self {
        Self { client, repos }
    }

    /// Newest version of a missing dependency that satisfies its constraint
    async fn resolve(&self, repo: &dyn RepoClient, dep: &Dependency) -> Result<Option<String>> {
        let candidates = match repo.fetch_package_index(&dep.name).await {
            Ok(index) => index.versions.into_iter().map(|v| v.version).collect(),
            Err(e) if e.is_not_found() => vec![repo.get_latest_version(&dep.name).await?],
            Err(e) => return Err(e.into()),
        };

        let best = candidates
            .iter()
            .filter(|v| !v.is_empty())
            .filter(|v| dep.version.is_empty() || validate_constraint(v, &dep.version).is_ok())
            .fold("", |best, v| max_version(best, v));

        Ok((!best.is_empty()).then(|| best.to_string()))
    }
}

#[async_trait]
impl DependencyValidator for ClusterDependencyValidator {
    async fn validate(
        &self,
        manifest: &PackageManifest,
        version: &str,
    ) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();
        if manifest.dependencies.is_empty() {
            return Ok(result);
        }

        let repo = self.repos.default().await;
        for dep in &manifest.dependencies {
            match self.client.get_cluster_package(&dep.name).await {
                Ok(installed) => {
                    let installed = InstalledPackage::from(installed);
                    if dep.version.is_empty() {
                        continue;
                    }
                    if let Err(e) = validate_constraint(installed.desired_version(), &dep.version)
                    {
                        result.conflicts.push(Conflict {
                            actual: PackageWithVersion::new(
                                &dep.name,
                                installed.desired_version(),
                            ),
                            required: PackageWithVersion::new(&dep.name, &dep.version),
                            cause: Some(e.to_string()),
                        });
                    }
                }
                Err(e) if e.is_not_found() => match self.resolve(repo.as_ref(), dep).await? {
                    Some(resolved) => result.requirements.push(Requirement {
                        package: PackageWithVersion::new(&dep.name, resolved),
                        transitive: false,
                    }),
                    None => result.conflicts.push(Conflict {
                        actual: PackageWithVersion::new(&dep.name, ""),
                        required: PackageWithVersion::new(&dep.name, &dep.version),
                        cause: Some("no available version satisfies the constraint".to_string()),
                    }),
                },
                Err(e) => return Err(e),
            }
        }

        let result = result.with_status();
        debug!(
            package = %manifest.name,
            version,
            status = ?result.status,
            "Validated dependencies"
        );
        Ok(result)
    }
}
