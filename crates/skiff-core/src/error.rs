//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    #[error("Invalid version constraint '{constraint}': {message}")]
    InvalidConstraint { constraint: String, message: String },

    #[error("Version {version} does not satisfy {constraint}: {}", unmet.join(", "))]
    ConstraintViolation {
        version: String,
        constraint: String,
        unmet: Vec<String>,
    },

    #[error("Failed to parse package manifest: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
