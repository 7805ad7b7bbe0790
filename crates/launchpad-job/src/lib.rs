//! Job configuration and lifecycle control for launchpad
//!
//! - [`config`]: validated job descriptors built against a settings resolver
//! - [`builder`]: per-accelerator replicated job builders (TPU, GPU A3)
//! - [`controller`]: JobSet submission/deletion and CPU VM remote execution
//! - [`command`]: shell-safe remote and container command formatting

pub mod builder;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod runner;

pub use config::{
    AcceleratorConfig, AcceleratorKind, BuilderOptions, Bundler, GpuOptions, JobConfig,
    JobConfigBuilder, TpuOptions,
};
pub use controller::{
    delete_jobset, CpuJob, DeleteOutcome, ExecuteOutcome, GkeJob, Job, JobSetApi, JobSetRef,
    KubeJobSetApi,
};
pub use error::JobError;
pub use runner::{CommandOutput, RemoteRunner, ShellRunner};
