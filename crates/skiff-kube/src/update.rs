//! Update transactions
//!
//! An [`UpdateTransaction`] is computed by [`Updater::prepare`] and applied by
//! [`Updater::apply`] or [`Updater::apply_blocking`]. Preparing never writes to
//! the cluster.
//!
//! For each selected package the repository catalog decides the target version.
//! Packages whose manifest conflicts with installed dependencies are reported
//! as conflict items and never applied.

use futures::StreamExt;
use futures::future::join_all;
use indexmap::IndexSet;
use skiff_core::{InstalledPackage, PackageManifest, is_upgradable};
use skiff_repo::RepoClientset;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{PackageClient, PackageEvent};
use crate::dependency::{Conflict, DependencyValidator, Requirement};
use crate::error::{KubeError, Result};
use crate::selection::PackageSelection;

/// A package and the version it should move to
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItem {
    pub package: InstalledPackage,
    /// Empty when the package is already up to date
    pub version: String,
}

impl UpdateItem {
    pub fn update_required(&self) -> bool {
        !self.version.is_empty()
    }
}

/// An update blocked by dependency conflicts
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictItem {
    pub item: UpdateItem,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateTransaction {
    pub items: Vec<UpdateItem>,
    pub conflict_items: Vec<ConflictItem>,
    /// Additional packages needed by the updated versions, without duplicates
    pub requirements: Vec<Requirement>,
}

impl UpdateTransaction {
    /// No item changes a version
    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|item| !item.update_required())
    }
}

/// Builds and applies update transactions
pub struct Updater {
    client: Arc<dyn PackageClient>,
    repos: Arc<RepoClientset>,
    validator: Arc<dyn DependencyValidator>,
}

impl Updater {
    pub fn new(
        client: Arc<dyn PackageClient>,
        repos: Arc<RepoClientset>,
        validator: Arc<dyn DependencyValidator>,
    ) -> Self {
        Self {
            client,
            repos,
            validator,
        }
    }

    /// Compute updates for every selected package.
    ///
    /// Selections are resolved concurrently; any failed selection fails the
    /// call. If at least one selection is explicit, up-to-date packages are
    /// kept as items with an empty version.
    pub async fn prepare(&self, selections: &[PackageSelection]) -> Result<UpdateTransaction> {
        let selected = join_all(
            selections
                .iter()
                .map(|selection| selection.get(self.client.as_ref())),
        )
        .await;

        let mut packages = Vec::new();
        let mut errors = Vec::new();
        for result in selected {
            match result {
                Ok(found) => packages.extend(found),
                Err(e) => errors.push(e),
            }
        }
        if let Some(err) = KubeError::combine(errors) {
            return Err(err);
        }

        let explicit = selections.iter().any(PackageSelection::explicit);
        let mut builder = TransactionBuilder::default();

        for pkg in packages {
            let repo = self.repos.for_package(&pkg).await;
            let index = repo.fetch_package_repo_index().await?;
            let Some(entry) = index.get(pkg.package_name()) else {
                return Err(KubeError::PackageNotFoundInIndex {
                    name: pkg.package_name().to_string(),
                    repository: repository_label(&pkg),
                });
            };

            if is_upgradable(pkg.desired_version(), &entry.latest_version) {
                let version = entry.latest_version.clone();
                let manifest = repo
                    .fetch_package_manifest(pkg.package_name(), &version)
                    .await?;
                self.add_validated(&mut builder, pkg, version, &manifest)
                    .await?;
            } else if explicit {
                debug!(package = %pkg, version = pkg.desired_version(), "Already up to date");
                builder.items.push(UpdateItem {
                    package: pkg,
                    version: String::new(),
                });
            }
        }

        Ok(builder.finish())
    }

    /// Compute an update of one package to a specific version.
    ///
    /// Fails without contacting the repository when `version` is not newer
    /// than the installed one.
    pub async fn prepare_for_version(
        &self,
        pkg: &InstalledPackage,
        version: &str,
    ) -> Result<UpdateTransaction> {
        if !is_upgradable(pkg.desired_version(), version) {
            return Err(KubeError::DowngradeOrEqual {
                installed: pkg.desired_version().to_string(),
                requested: version.to_string(),
            });
        }

        let manifest = self
            .repos
            .for_package(pkg)
            .await
            .fetch_package_manifest(pkg.package_name(), version)
            .await?;

        let mut builder = TransactionBuilder::default();
        self.add_validated(&mut builder, pkg.clone(), version.to_string(), &manifest)
            .await?;
        Ok(builder.finish())
    }

    /// Write the new versions without waiting for them to be installed
    pub async fn apply(&self, tx: &UpdateTransaction) -> Result<Vec<InstalledPackage>> {
        self.apply_items(tx, false).await
    }

    /// Write the new versions, waiting for each one to be installed before
    /// moving on to the next
    pub async fn apply_blocking(&self, tx: &UpdateTransaction) -> Result<Vec<InstalledPackage>> {
        self.apply_items(tx, true).await
    }

    /// Set the desired version of a single package
    pub async fn update_package(
        &self,
        pkg: &InstalledPackage,
        version: &str,
    ) -> Result<InstalledPackage> {
        let updated = self.client.update_version(pkg, version).await?;
        info!(
            package = %pkg,
            from = pkg.desired_version(),
            to = version,
            "Updated package version"
        );
        Ok(updated)
    }

    async fn add_validated(
        &self,
        builder: &mut TransactionBuilder,
        pkg: InstalledPackage,
        version: String,
        manifest: &PackageManifest,
    ) -> Result<()> {
        let result = self.validator.validate(manifest, &version).await?;
        let item = UpdateItem {
            package: pkg,
            version,
        };

        if result.has_conflicts() {
            warn!(
                package = %item.package,
                version = %item.version,
                conflicts = result.conflicts.len(),
                "Update blocked by dependency conflicts"
            );
            builder.conflict_items.push(ConflictItem {
                item,
                conflicts: result.conflicts,
            });
        } else {
            builder.requirements.extend(result.requirements);
            builder.items.push(item);
        }
        Ok(())
    }

    async fn apply_items(
        &self,
        tx: &UpdateTransaction,
        blocking: bool,
    ) -> Result<Vec<InstalledPackage>> {
        let mut updated = Vec::new();

        for item in tx.items.iter().filter(|item| item.update_required()) {
            let failed = |e: KubeError| KubeError::UpdateFailed {
                name: item.package.to_string(),
                source: Box::new(e),
            };

            let mut pkg = self
                .update_package(&item.package, &item.version)
                .await
                .map_err(failed)?;
            if blocking {
                pkg = self.await_update(&pkg).await.map_err(failed)?;
            }
            updated.push(pkg);
        }

        Ok(updated)
    }

    /// Wait until the operator reports the desired version as installed
    async fn await_update(&self, pkg: &InstalledPackage) -> Result<InstalledPackage> {
        let mut events = self.client.watch(pkg).await?;

        while let Some(event) = events.next().await {
            let event = event?;
            let observed = event.package();
            // Other objects, or state from before the update
            if !observed.is_same_object(pkg) || observed.desired_version() != pkg.desired_version()
            {
                continue;
            }

            if let PackageEvent::Deleted(_) = event {
                return Err(KubeError::PackageNotFound {
                    kind: pkg.kind(),
                    name: pkg.name(),
                    namespace: pkg.namespace(),
                });
            }
            if observed.is_converged() {
                debug!(package = %pkg, version = pkg.desired_version(), "Update confirmed");
                return Ok(observed.clone());
            }
            if let Some(ready) = observed.ready_condition()
                && ready.status == "False"
            {
                return Err(KubeError::NotReady {
                    name: pkg.to_string(),
                    reason: ready.reason.clone(),
                    message: ready.message.clone(),
                });
            }
        }

        Err(KubeError::WatchClosed {
            name: pkg.to_string(),
        })
    }
}

/// Mutable state while a transaction is being computed
#[derive(Default)]
struct TransactionBuilder {
    items: Vec<UpdateItem>,
    conflict_items: Vec<ConflictItem>,
    requirements: IndexSet<Requirement>,
}

impl TransactionBuilder {
    fn finish(self) -> UpdateTransaction {
        UpdateTransaction {
            items: self.items,
            conflict_items: self.conflict_items,
            requirements: self.requirements.into_iter().collect(),
        }
    }
}

fn repository_label(pkg: &InstalledPackage) -> String {
    match pkg.repository_name() {
        "" => "default".to_string(),
        name => name.to_string(),
    }
}
