//! Error types shared across launchpad crates
//!
//! Errors are structured with fields to aid debugging. Each variant carries
//! the job name, account, or settings path it relates to where one is known.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for launchpad operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid or missing job configuration
    #[error("validation error for {job}: {message}")]
    Validation {
        /// Name of the job with invalid configuration
        job: String,
        /// Description of what's invalid
        message: String,
        /// The invalid option (e.g., "max_tries")
        field: Option<String>,
    },

    /// Credential resolution or impersonation failure
    #[error("auth error for {account}: {message}")]
    Auth {
        /// Identity that was requested ("ambient" when none was)
        account: String,
        /// Description of what failed
        message: String,
    },

    /// Settings file could not be read or parsed
    #[error("settings error [{path}]: {message}")]
    Settings {
        /// Path of the settings file
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "discovery", "client")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            job: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a named job and option
    pub fn validation_for_field(
        job: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            job: job.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an auth error for the requested identity
    pub fn auth(account: Option<&str>, msg: impl Into<String>) -> Self {
        Self::Auth {
            account: account.unwrap_or("ambient").to_string(),
            message: msg.into(),
        }
    }

    /// Create a settings error for a file path
    pub fn settings(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Settings {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Get the job name if this error is associated with a specific job
    pub fn job(&self) -> Option<&str> {
        match self {
            Error::Validation { job, .. } if job != UNKNOWN_CONTEXT => Some(job),
            _ => None,
        }
    }

    /// Returns true if the error is a permission problem rather than a transport one
    pub fn is_auth(&self) -> bool {
        match self {
            Error::Auth { .. } => true,
            Error::Kube { source } => matches!(
                source,
                kube::Error::Api(ae) if ae.code == 401 || ae.code == 403
            ),
            _ => false,
        }
    }
}
