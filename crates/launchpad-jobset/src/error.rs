//! JobSet compilation errors

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("max_tries must be at least 1 for job '{job}'")]
    InvalidMaxTries { job: String },

    #[error("replicated job '{name}' appears more than once in job '{job}'")]
    DuplicateReplicatedJob { job: String, name: String },

    #[error("replicated job {index} in job '{job}' has no name")]
    UnnamedReplicatedJob { job: String, index: usize },
}
