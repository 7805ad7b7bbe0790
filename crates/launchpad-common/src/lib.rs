//! Common types for launchpad: errors, settings, credentials, and Kubernetes helpers

#![deny(missing_docs)]

pub mod credentials;
pub mod error;
pub mod kube_utils;
pub mod settings;

pub use credentials::{CredentialProvider, Credentials, KubeCredentialProvider};
pub use error::Error;
pub use settings::{FileSettings, SettingKey, SettingsResolver, StaticSettings};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace used when a job does not specify one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Kubernetes service account used by job pods when neither the job nor the settings name one
pub const DEFAULT_K8S_SERVICE_ACCOUNT: &str = "default";
