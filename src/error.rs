// ABOUTME: Application-wide error types for podgarden.
// ABOUTME: Uses thiserror for configuration and binary-level failures.

use crate::garden::GardenError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to connect to {what}: {message}")]
    Connect { what: &'static str, message: String },

    #[error(transparent)]
    Garden(#[from] GardenError),
}

pub type Result<T> = std::result::Result<T, Error>;
