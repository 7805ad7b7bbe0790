//! Launchpad CLI library
//!
//! Subcommands:
//! - `tpu` / `gpu`: launch, print, or delete accelerator jobs submitted as JobSets
//! - `cpu run`: run a command on an existing VM
//! - `docker-command`: print the `docker run` line for a command

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use commands::cpu::CpuAction;
use commands::docker::DockerCommandArgs;
use commands::jobset::{GpuAction, TpuAction};

/// Launch TPU and GPU jobs on Kubernetes and commands on VMs
#[derive(Parser, Debug)]
#[command(name = "launchpad", version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to $LAUNCHPAD_SETTINGS, then ~/.launchpad/settings.yaml)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// TPU jobs
    #[command(subcommand)]
    Tpu(TpuAction),

    /// GPU jobs
    #[command(subcommand)]
    Gpu(GpuAction),

    /// CPU VM jobs
    #[command(subcommand)]
    Cpu(CpuAction),

    /// Print a docker run command line
    DockerCommand(DockerCommandArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = self.settings.as_deref();
        match self.command {
            Commands::Tpu(action) => commands::jobset::run_tpu(action, settings).await,
            Commands::Gpu(action) => commands::jobset::run_gpu(action, settings).await,
            Commands::Cpu(action) => commands::cpu::run(action, settings).await,
            Commands::DockerCommand(args) => commands::docker::run(args),
        }
    }
}
