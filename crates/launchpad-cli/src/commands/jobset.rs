//! TPU and GPU JobSet commands

use std::path::Path;
use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::info;

use launchpad_common::kube_utils::JOBSET_FALLBACK_API_VERSION;
use launchpad_common::{KubeCredentialProvider, DEFAULT_NAMESPACE};
use launchpad_job::{
    delete_jobset, BuilderOptions, DeleteOutcome, ExecuteOutcome, GkeJob, GpuOptions, Job,
    JobSetRef, KubeJobSetApi, ShellRunner, TpuOptions,
};

use super::{print_document, JobArgs, OutputFormat};
use crate::Result;

/// TPU job flags
#[derive(Args, Debug, Clone)]
pub struct TpuArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Capacity reservation to schedule onto
    #[arg(long, conflicts_with = "enable_spot")]
    pub reservation: Option<String>,

    /// Schedule onto spot capacity
    #[arg(long)]
    pub enable_spot: bool,
}

impl TpuArgs {
    fn split(self) -> (JobArgs, BuilderOptions) {
        let options = BuilderOptions::Tpu(TpuOptions {
            reservation: self.reservation,
            enable_spot: self.enable_spot,
        });
        (self.job, options)
    }
}

/// GPU job flags
#[derive(Args, Debug, Clone)]
pub struct GpuArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Size limit of the /dev/shm volume, e.g. 256Gi
    #[arg(long)]
    pub shm_size_limit: Option<String>,
}

impl GpuArgs {
    fn split(self) -> (JobArgs, BuilderOptions) {
        let options = BuilderOptions::Gpu(GpuOptions {
            shm_size_limit: self.shm_size_limit,
        });
        (self.job, options)
    }
}

/// Flags for printing a JobSet
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    /// apiVersion to stamp on the printed JobSet
    #[arg(long, default_value = JOBSET_FALLBACK_API_VERSION)]
    pub api_version: String,
}

/// Flags for deleting a JobSet
#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// JobSet name
    #[arg(long)]
    pub name: String,

    #[arg(long, short = 'n', default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Service account to impersonate for cluster API calls
    #[arg(long)]
    pub impersonate_account: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub impersonate_scopes: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum TpuAction {
    /// Submit a TPU job as a JobSet
    Launch(TpuArgs),
    /// Print the JobSet a TPU job would submit
    Build {
        #[command(flatten)]
        args: TpuArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Delete a JobSet and its pods
    Delete(DeleteArgs),
}

#[derive(Subcommand, Debug)]
pub enum GpuAction {
    /// Submit a GPU job as a JobSet
    Launch(GpuArgs),
    /// Print the JobSet a GPU job would submit
    Build {
        #[command(flatten)]
        args: GpuArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Delete a JobSet and its pods
    Delete(DeleteArgs),
}

pub async fn run_tpu(action: TpuAction, settings: Option<&Path>) -> Result<()> {
    match action {
        TpuAction::Launch(args) => {
            let (job, options) = args.split();
            launch(job, options, settings).await
        }
        TpuAction::Build { args, build: out } => {
            let (job, options) = args.split();
            build(job, options, out, settings)
        }
        TpuAction::Delete(args) => delete(args).await,
    }
}

pub async fn run_gpu(action: GpuAction, settings: Option<&Path>) -> Result<()> {
    match action {
        GpuAction::Launch(args) => {
            let (job, options) = args.split();
            launch(job, options, settings).await
        }
        GpuAction::Build { args, build: out } => {
            let (job, options) = args.split();
            build(job, options, out, settings)
        }
        GpuAction::Delete(args) => delete(args).await,
    }
}

async fn launch(args: JobArgs, options: BuilderOptions, settings: Option<&Path>) -> Result<()> {
    let config = args.into_config(options, settings)?;
    let job = Job::new(
        config,
        Arc::new(KubeCredentialProvider::new()),
        Arc::new(KubeJobSetApi),
        Arc::new(ShellRunner),
    )?;
    match job.execute().await? {
        ExecuteOutcome::Submitted(created) => {
            info!(job = %job.config().name(), "launched");
            print_document(&serde_json::to_value(&created)?, OutputFormat::Json)?;
        }
        ExecuteOutcome::Ran(output) => print!("{}", output.stdout),
    }
    Ok(())
}

fn build(
    args: JobArgs,
    options: BuilderOptions,
    out: BuildArgs,
    settings: Option<&Path>,
) -> Result<()> {
    let config = args.into_config(options, settings)?;
    let job = GkeJob::new(
        config,
        Arc::new(KubeCredentialProvider::new()),
        Arc::new(KubeJobSetApi),
    )?;
    let resource = job.build_jobset()?.into_resource(out.api_version);
    print_document(&serde_json::to_value(&resource)?, out.output)
}

async fn delete(args: DeleteArgs) -> Result<()> {
    let target = JobSetRef {
        name: args.name,
        namespace: args.namespace,
        impersonate_account: args.impersonate_account,
        impersonate_scopes: args.impersonate_scopes,
    };
    let outcome = delete_jobset(&target, &KubeCredentialProvider::new(), &KubeJobSetApi).await?;
    match outcome {
        DeleteOutcome::Requested => {
            println!("JobSet {}/{} deletion requested", target.namespace, target.name)
        }
        DeleteOutcome::NotFound => {
            println!("JobSet {}/{} not found", target.namespace, target.name)
        }
    }
    Ok(())
}
