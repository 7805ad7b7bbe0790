//! Replicated job builders
//!
//! Each accelerator family produces its own replicated jobs and may add JobSet
//! annotations. The JobSet compiler only sees the produced sequence, so adding
//! a family means adding a [`ReplicatedJobBuilder`] implementation and a
//! [`BuilderOptions`] variant.

pub mod gpu;
pub mod pod;
pub mod tpu;

use std::collections::BTreeMap;

use launchpad_jobset::ReplicatedJobSpec;

use crate::config::{AcceleratorConfig, AcceleratorKind, BuilderOptions, JobConfig};
use crate::error::JobError;

pub use gpu::A3ReplicatedJob;
pub use tpu::TpuReplicatedJob;

/// Produces the replicated jobs for one accelerator family
pub trait ReplicatedJobBuilder: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> AcceleratorKind;

    /// Replicated jobs to place under `spec.replicatedJobs`
    fn build(&self) -> Vec<ReplicatedJobSpec>;

    /// Annotations added to the JobSet metadata
    fn jobset_annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Job fields every builder needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildContext {
    pub name: String,
    pub command: String,
    pub image: String,
    pub service_account: String,
    pub env_vars: BTreeMap<String, String>,
    pub output_dir: Option<String>,
    pub enable_pre_provisioner: bool,
}

impl BuildContext {
    pub fn from_config(config: &JobConfig) -> Result<Self, JobError> {
        let image = config.image().ok_or_else(|| {
            JobError::config(config.name(), "only docker bundler supported for JobSet jobs")
        })?;
        Ok(Self {
            name: config.name().to_string(),
            command: config.command().to_string(),
            image: image.to_string(),
            service_account: config
                .service_account()
                .unwrap_or(launchpad_common::DEFAULT_K8S_SERVICE_ACCOUNT)
                .to_string(),
            env_vars: config.env_vars().clone(),
            output_dir: config.output_dir().map(str::to_string),
            enable_pre_provisioner: config.enable_pre_provisioner(),
        })
    }
}

/// Check that an accelerator is legal for a builder variant
pub fn validate_accelerator(
    builder: &BuilderOptions,
    accelerator: &AcceleratorConfig,
) -> Result<(), String> {
    let kind = AcceleratorKind::from_instance_type(&accelerator.instance_type);
    if kind != Some(builder.kind()) {
        return Err(format!(
            "instance type {} cannot be used with the {} builder",
            accelerator.instance_type,
            builder.kind()
        ));
    }
    match builder {
        BuilderOptions::Tpu(options) => {
            tpu::tpu_topology(&accelerator.instance_type)
                .ok_or_else(|| format!("unknown TPU type: {}", accelerator.instance_type))?;
            tpu::validate_options(options)
        }
        BuilderOptions::Gpu(_) => gpu::a3_machine(&accelerator.instance_type)
            .map(|_| ())
            .ok_or_else(|| format!("unsupported GPU type: {}", accelerator.instance_type)),
    }
}

/// Select the builder for a JobSet job from its configured variant
pub fn builder_for(config: &JobConfig) -> Result<Box<dyn ReplicatedJobBuilder>, JobError> {
    let name = config.name();
    let options = config.builder_options().ok_or_else(|| {
        JobError::config(name, "JobSet jobs require a replicated job builder")
    })?;
    let accelerator = config
        .accelerator()
        .ok_or_else(|| JobError::config(name, "JobSet jobs require an accelerator"))?;
    validate_accelerator(options, accelerator).map_err(|e| JobError::config(name, e))?;
    let ctx = BuildContext::from_config(config)?;

    let builder: Box<dyn ReplicatedJobBuilder> = match options {
        BuilderOptions::Tpu(tpu_options) => Box::new(
            TpuReplicatedJob::new(ctx, accelerator, tpu_options.clone())
                .map_err(|e| JobError::config(name, e))?,
        ),
        BuilderOptions::Gpu(gpu_options) => Box::new(
            A3ReplicatedJob::new(ctx, accelerator, gpu_options.clone())
                .map_err(|e| JobError::config(name, e))?,
        ),
    };
    Ok(builder)
}
