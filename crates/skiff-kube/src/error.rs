//! Error types for skiff-kube

use skiff_core::PackageKind;
use skiff_repo::RepoError;
use thiserror::Error;

/// Result type for skiff-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while selecting, validating or updating packages
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Repository access failed
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// Installed package does not exist
    #[error("{kind} '{name}' not found{}", .namespace.as_ref().map(|ns| format!(" in namespace '{}'", ns)).unwrap_or_default())]
    PackageNotFound {
        kind: PackageKind,
        name: String,
        namespace: Option<String>,
    },

    /// Package was removed from its repository's catalog
    #[error("package {name} not found in index of repository '{repository}'")]
    PackageNotFoundInIndex { name: String, repository: String },

    /// Requested version does not move the package forward
    #[error("can't update to downgraded or equal version ({requested} is not newer than {installed})")]
    DowngradeOrEqual { installed: String, requested: String },

    /// Ready condition turned False while waiting for an update
    #[error("package {name} is not ready (reason {reason}): {message}")]
    NotReady {
        name: String,
        reason: String,
        message: String,
    },

    /// Watch ended before the update was confirmed
    #[error("watch closed unexpectedly while waiting for {name}")]
    WatchClosed { name: String },

    /// Applying an update item failed
    #[error("could not update package {name}: {source}")]
    UpdateFailed {
        name: String,
        #[source]
        source: Box<KubeError>,
    },

    /// Dependency validation failed
    #[error("dependency validation failed: {0}")]
    Validation(String),

    /// Several concurrent branches failed
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<KubeError>),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<skiff_core::CoreError> for KubeError {
    fn from(e: skiff_core::CoreError) -> Self {
        KubeError::Validation(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error or a missing package
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::PackageNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Combine branch errors into one, keeping every error
    pub fn combine(mut errors: Vec<KubeError>) -> Option<KubeError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(KubeError::Multiple(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let cluster = KubeError::PackageNotFound {
            kind: PackageKind::ClusterPackage,
            name: "nginx".to_string(),
            namespace: None,
        };
        assert!(cluster.is_not_found());
        assert_eq!(cluster.to_string(), "ClusterPackage 'nginx' not found");

        let namespaced = KubeError::PackageNotFound {
            kind: PackageKind::Package,
            name: "cache".to_string(),
            namespace: Some("apps".to_string()),
        };
        assert_eq!(
            namespaced.to_string(),
            "Package 'cache' not found in namespace 'apps'"
        );
    }

    #[test]
    fn test_combine() {
        assert!(KubeError::combine(vec![]).is_none());
        let combined = KubeError::combine(vec![
            KubeError::Validation("a".to_string()),
            KubeError::WatchClosed {
                name: "b".to_string(),
            },
        ])
        .unwrap();
        assert!(matches!(combined, KubeError::Multiple(ref errors) if errors.len() == 2));
    }
}
