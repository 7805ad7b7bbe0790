//! Job-specific error types

use launchpad_jobset::CompileError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Invalid or missing configuration, raised at construction
    #[error("invalid configuration for job '{job}': {message}")]
    Config { job: String, message: String },

    #[error("auth error for {account}: {message}")]
    Auth { account: String, message: String },

    /// Cluster rejected the JobSet create request
    #[error("failed to submit JobSet '{job}': {source}")]
    Submission {
        job: String,
        #[source]
        source: kube::Error,
    },

    #[error("JobSet CRD (jobset.x-k8s.io/JobSet) not available, cannot submit '{job}'")]
    JobSetCrdMissing { job: String },

    #[error("failed to delete JobSet '{job}': {source}")]
    Deletion {
        job: String,
        #[source]
        source: kube::Error,
    },

    /// Remote command exited unsuccessfully
    #[error("remote command failed with status {}: {stderr}", exit_status(.status))]
    RemoteExec {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{0}")]
    Common(launchpad_common::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl JobError {
    pub fn config(job: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            job: job.into(),
            message: msg.into(),
        }
    }

    /// True for the failures a create request can surface
    pub fn is_submission(&self) -> bool {
        matches!(
            self,
            JobError::Submission { .. } | JobError::JobSetCrdMissing { .. }
        )
    }
}

impl From<launchpad_common::Error> for JobError {
    fn from(err: launchpad_common::Error) -> Self {
        match err {
            launchpad_common::Error::Auth { account, message } => JobError::Auth { account, message },
            launchpad_common::Error::Validation { job, message, .. } => {
                JobError::Config { job, message }
            }
            other => JobError::Common(other),
        }
    }
}

/// Compiler rejections are caller contract violations
impl From<CompileError> for JobError {
    fn from(err: CompileError) -> Self {
        let message = err.to_string();
        let job = match err {
            CompileError::InvalidMaxTries { job }
            | CompileError::DuplicateReplicatedJob { job, .. }
            | CompileError::UnnamedReplicatedJob { job, .. } => job,
        };
        JobError::Config { job, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_keep_their_category() {
        let err: JobError = launchpad_common::Error::auth(Some("ml:trainer"), "denied").into();
        assert!(matches!(err, JobError::Auth { ref account, .. } if account == "ml:trainer"));
    }

    #[test]
    fn validation_errors_become_config_errors() {
        let err: JobError =
            launchpad_common::Error::validation_for_field("job1", "zone", "zone is required")
                .into();
        assert!(matches!(err, JobError::Config { ref job, .. } if job == "job1"));
    }

    #[test]
    fn compile_errors_become_config_errors() {
        let err: JobError = CompileError::InvalidMaxTries {
            job: "job1".to_string(),
        }
        .into();
        match err {
            JobError::Config { job, message } => {
                assert_eq!(job, "job1");
                assert!(message.contains("max_tries"));
            }
            other => panic!("Expected Config error, got {:?}", other),
        }

        let err: JobError = CompileError::UnnamedReplicatedJob {
            job: "job2".to_string(),
            index: 0,
        }
        .into();
        assert!(matches!(err, JobError::Config { ref job, .. } if job == "job2"));
    }

    #[test]
    fn remote_exec_error_shows_status_and_stderr() {
        let err = JobError::RemoteExec {
            status: Some(255),
            stdout: String::new(),
            stderr: "Connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "remote command failed with status 255: Connection refused"
        );

        let killed = JobError::RemoteExec {
            status: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn missing_crd_is_a_submission_failure() {
        let err = JobError::JobSetCrdMissing {
            job: "job1".to_string(),
        };
        assert!(err.is_submission());
        assert!(!JobError::config("job1", "bad").is_submission());
    }
}
