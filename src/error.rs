use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while declaring or synthesizing a stack
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Validation failed on resource '{resource}'\n{message}")]
    InvalidProperty { resource: String, message: String },

    #[error("Duplicate construct id '{0}'. Ids must be unique within a stack")]
    DuplicateId(String),

    #[error("Resource '{from}' references '{target}' but no such resource exists in this stack")]
    DanglingReference { from: String, target: String },

    #[error("Invalid stack name {0}\nMust only consist of alphanumeric characters and hyphens, Must start with an alphabetical character, and cannot be longer than 128 characters.")]
    InvalidStackName(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Customization script failed: {0}")]
    Script(String),

    #[error("Failed to stage asset {path:?}: {message}")]
    Asset { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl StackError {
    pub fn invalid(resource: &str, message: impl Into<String>) -> Self {
        StackError::InvalidProperty { resource: resource.to_string(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
