//! JobSet compiler for launchpad batch jobs
//!
//! Composes builder-produced replicated jobs, restart policy and queueing
//! intent into a `jobset.x-k8s.io` JobSet document.
//! Pure compilation crate with no cluster access.

mod compiler;
mod error;
mod types;

pub use compiler::{
    build_jobset, EXCLUSIVE_TOPOLOGY_ANNOTATION, GKE_NODEPOOL_TOPOLOGY, QUEUE_NAME_ANNOTATION,
};
pub use error::CompileError;
pub use types::{
    FailurePolicy, JobSetConfig, JobSetDocument, JobSetMetadata, JobSetSpec, ReplicatedJobSpec,
    SubmittedJobSet,
};
