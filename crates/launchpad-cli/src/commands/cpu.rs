//! CPU VM commands

use std::path::Path;
use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::info;

use launchpad_job::command::DEFAULT_SSH_TOOL;
use launchpad_job::{CpuJob, JobConfig, ShellRunner};

use crate::config::load_settings;
use crate::Result;

#[derive(Subcommand, Debug)]
pub enum CpuAction {
    /// Run a command on an existing VM over ssh
    Run(CpuRunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CpuRunArgs {
    /// VM name
    #[arg(long)]
    pub name: String,

    /// Command to run in /root as root
    #[arg(long)]
    pub command: String,

    /// Cloud project (defaults to the `project` setting)
    #[arg(long)]
    pub project: Option<String>,

    /// Cloud zone (defaults to the `zone` setting)
    #[arg(long)]
    pub zone: Option<String>,

    /// Settings section to read defaults from
    #[arg(long)]
    pub env_id: Option<String>,

    /// Command prefix used to reach the VM
    #[arg(long, default_value = DEFAULT_SSH_TOOL)]
    pub ssh_tool: String,

    /// Run inside a detached screen session of this name
    #[arg(long)]
    pub detached_session: Option<String>,
}

impl CpuRunArgs {
    fn into_config(self, settings: Option<&Path>) -> Result<(JobConfig, String, Option<String>)> {
        let resolver = load_settings(settings, self.env_id.clone())?;
        let mut builder = JobConfig::builder(self.name).command(self.command);
        if let Some(project) = self.project {
            builder = builder.project(project);
        }
        if let Some(zone) = self.zone {
            builder = builder.zone(zone);
        }
        if let Some(env_id) = self.env_id {
            builder = builder.env_id(env_id);
        }
        Ok((builder.build(&resolver)?, self.ssh_tool, self.detached_session))
    }
}

pub async fn run(action: CpuAction, settings: Option<&Path>) -> Result<()> {
    match action {
        CpuAction::Run(args) => {
            let (config, ssh_tool, detached_session) = args.into_config(settings)?;
            let mut job = CpuJob::new(config, Arc::new(ShellRunner)).with_ssh_tool(ssh_tool);
            if let Some(session) = detached_session {
                job = job.with_detached_session(session);
            }
            let output = job.execute().await?;
            info!(vm = %job.config().name(), "command finished");
            print!("{}", output.stdout);
            Ok(())
        }
    }
}
