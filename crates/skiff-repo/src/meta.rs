//! Cross-repository aggregation
//!
//! Merge rules for [`RepoAggregator::fetch_meta_index`]: repositories are
//! visited in descending name order. The latest version of an entry is the
//! highest across all repositories. Display fields come from the non-default
//! repository that sorts first by name, or from the default repository when
//! no other repository offers the package.

use futures::future::join_all;
use kube::ResourceExt;
use skiff_core::{PackageRepository, max_version};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::warn;

use crate::clientset::RepoClientset;
use crate::error::{PartialResult, RepoError, Result};
use crate::index::{MetaIndex, MetaIndexItem};

/// Read-only view over every repository of a clientset
pub struct RepoAggregator<'a> {
    clientset: &'a RepoClientset,
}

impl<'a> RepoAggregator<'a> {
    pub fn new(clientset: &'a RepoClientset) -> Self {
        Self { clientset }
    }

    /// Merge all repository catalogs.
    ///
    /// Repositories that fail are skipped; their errors are returned next to the
    /// merged catalog.
    pub async fn fetch_meta_index(&self) -> Result<PartialResult<MetaIndex>> {
        let mut repos = self.clientset.source().list_package_repositories().await?;
        repos.sort_by_key(|r| r.name_any());
        repos.reverse();

        let indices = join_all(repos.iter().map(|repo| async move {
            self.clientset
                .for_repo(repo)
                .await
                .fetch_package_repo_index()
                .await
        }))
        .await;

        let mut merged: BTreeMap<String, MetaIndexItem> = BTreeMap::new();
        let mut errors = Vec::new();

        for (repo, result) in repos.iter().zip(indices) {
            let repo_name = repo.name_any();
            let index = match result {
                Ok(index) => index,
                Err(e) => {
                    warn!(repository = %repo_name, error = %e, "Skipping repository catalog");
                    errors.push(e);
                    continue;
                }
            };

            for item in index.packages {
                match merged.entry(item.name.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(MetaIndexItem {
                            item,
                            repos: vec![repo_name.clone()],
                        });
                    }
                    Entry::Occupied(mut slot) => {
                        let meta = slot.get_mut();
                        // Visiting in reverse order, so prepending keeps names ascending
                        meta.repos.insert(0, repo_name.clone());
                        let latest =
                            max_version(&meta.item.latest_version, &item.latest_version).to_string();
                        if !repo.is_default() {
                            meta.item = item;
                        }
                        meta.item.latest_version = latest;
                    }
                }
            }
        }

        Ok(PartialResult {
            value: MetaIndex {
                packages: merged.into_values().collect(),
            },
            error: RepoError::combine(errors),
        })
    }

    /// Highest version of a package across all repositories.
    ///
    /// Repositories without a version index for the package (HTTP 404) are
    /// skipped; any other failure fails the whole call.
    pub async fn get_latest_version(&self, name: &str) -> Result<String> {
        let mut repos = self.clientset.source().list_package_repositories().await?;
        repos.sort_by_key(|r| r.name_any());

        let results = join_all(repos.iter().map(|repo| async move {
            self.clientset
                .for_repo(repo)
                .await
                .fetch_package_index(name)
                .await
        }))
        .await;

        let mut latest = String::new();
        let mut found = false;
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(index) => {
                    found = true;
                    latest = max_version(&latest, &index.latest_version).to_string();
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => errors.push(e),
            }
        }

        if let Some(err) = RepoError::combine(errors) {
            return Err(err);
        }
        if !found {
            return Err(RepoError::PackageNotFound {
                name: name.to_string(),
            });
        }
        Ok(latest)
    }

    /// Every repository whose catalog lists the package.
    ///
    /// If some catalogs could not be fetched the result is partial and its error
    /// is [`RepoError::Partial`]; if nothing was found and fetches failed, the
    /// combined error is returned instead.
    pub async fn get_repos_for_package(
        &self,
        name: &str,
    ) -> Result<PartialResult<Vec<PackageRepository>>> {
        let mut repos = self.clientset.source().list_package_repositories().await?;
        repos.sort_by_key(|r| r.name_any());

        let indices = join_all(repos.iter().map(|repo| async move {
            self.clientset
                .for_repo(repo)
                .await
                .fetch_package_repo_index()
                .await
        }))
        .await;

        let mut found = Vec::new();
        let mut errors = Vec::new();
        for (repo, result) in repos.into_iter().zip(indices) {
            match result {
                Ok(index) if index.get(name).is_some() => found.push(repo),
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }

        match RepoError::combine(errors) {
            None => Ok(PartialResult::complete(found)),
            Some(err) if found.is_empty() => Err(err),
            Some(err) => Ok(PartialResult {
                value: found,
                error: Some(RepoError::Partial(Box::new(err))),
            }),
        }
    }
}
