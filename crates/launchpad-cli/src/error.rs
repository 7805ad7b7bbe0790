//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Job(#[from] launchpad_job::JobError),

    #[error("{0}")]
    Common(#[from] launchpad_common::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings file not found: {path}")]
    SettingsNotFound { path: PathBuf },
}

