//! Error types for repository operations

use thiserror::Error;

/// Repository operation errors
///
/// Cloneable so a deferred-error client can hand out the same error on every call.
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    // ============ Transport Errors ============
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} failed with HTTP status {code}")]
    Status { url: String, code: u16 },

    #[error("Could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Unacceptable media type {media_type} from {url}")]
    UnacceptableMediaType { url: String, media_type: String },

    // ============ Configuration Errors ============
    #[error("Invalid auth configuration for repository {repository}: {message}")]
    AuthConfig { repository: String, message: String },

    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Lookup Errors ============
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Default repository not found")]
    DefaultRepositoryNotFound,

    #[error("Multiple default repositories: {}", .names.join(", "))]
    MultipleDefaultRepositories { names: Vec<String> },

    #[error("Package {name} is not offered by any repository")]
    PackageNotFound { name: String },

    #[error("Cluster error: {message}")]
    Cluster { message: String },

    // ============ Composite Errors ============
    #[error("{}", join_errors(.0))]
    Multiple(Vec<RepoError>),

    /// A usable result was still produced; the inner error lists what failed
    #[error("Partial result: {0}")]
    Partial(Box<RepoError>),

    // ============ IO Errors ============
    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

fn join_errors(errors: &[RepoError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RepoError {
    /// HTTP 404, possibly inside a partial-result wrapper
    pub fn is_not_found(&self) -> bool {
        match self {
            RepoError::Status { code, .. } => *code == 404,
            RepoError::Partial(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, RepoError::Partial(_))
    }

    /// Combine branch errors into one, keeping every error.
    ///
    /// Returns `None` for an empty list and the error itself for a single one.
    pub fn combine(mut errors: Vec<RepoError>) -> Option<RepoError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(RepoError::Multiple(errors)),
        }
    }
}

/// A value that may be incomplete, together with the errors that made it so
#[derive(Debug, Clone)]
pub struct PartialResult<T> {
    pub value: T,
    pub error: Option<RepoError>,
}

impl<T> PartialResult<T> {
    pub fn complete(value: T) -> Self {
        Self { value, error: None }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Strict conversion for callers that need every source to succeed
    pub fn into_result(self) -> Result<T> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        if let Some(status) = e.status() {
            RepoError::Status {
                url,
                code: status.as_u16(),
            }
        } else if e.is_connect() {
            RepoError::Transport {
                url,
                message: format!("Connection failed: {}", e),
            }
        } else {
            RepoError::Transport {
                url,
                message: e.to_string(),
            }
        }
    }
}

impl From<kube::Error> for RepoError {
    fn from(e: kube::Error) -> Self {
        RepoError::Cluster {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for RepoError {
    fn from(e: std::io::Error) -> Self {
        RepoError::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
