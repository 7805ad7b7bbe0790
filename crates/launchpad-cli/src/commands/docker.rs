//! Docker command formatting

use std::collections::BTreeMap;

use clap::Args;

use launchpad_job::command::{docker_command, DockerRunOptions};

use super::parse_volume;
use crate::Result;

/// Print the `docker run` line that executes a command in an image
#[derive(Args, Debug, Clone)]
pub struct DockerCommandArgs {
    /// Command to run inside the container
    pub command: String,

    #[arg(long)]
    pub image: String,

    /// Run detached under this container name
    #[arg(long)]
    pub detached_session: Option<String>,

    /// Host environment variable to expose to the container (repeatable)
    #[arg(long = "env")]
    pub env: Vec<String>,

    /// Volume mount SRC:DST (repeatable)
    #[arg(long = "volume", value_parser = parse_volume)]
    pub volumes: Vec<(String, String)>,

    /// Extra `docker run` flag (repeatable)
    #[arg(long = "docker-flag", allow_hyphen_values = true)]
    pub extra_flags: Vec<String>,
}

impl DockerCommandArgs {
    pub fn options(&self) -> DockerRunOptions {
        DockerRunOptions {
            image: self.image.clone(),
            detached_session: self.detached_session.clone(),
            env: self.env.clone(),
            volumes: self.volumes.iter().cloned().collect::<BTreeMap<_, _>>(),
            extra_flags: self.extra_flags.clone(),
        }
    }
}

pub fn run(args: DockerCommandArgs) -> Result<()> {
    println!("{}", docker_command(&args.command, &args.options()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_run_options() {
        let args = DockerCommandArgs {
            command: "python train.py".to_string(),
            image: "trainer:latest".to_string(),
            detached_session: None,
            env: vec!["HF_TOKEN".to_string()],
            volumes: vec![("/data".to_string(), "/mnt/data".to_string())],
            extra_flags: vec!["--privileged".to_string()],
        };
        let options = args.options();
        assert_eq!(options.image, "trainer:latest");
        assert_eq!(options.env, vec!["HF_TOKEN"]);
        assert_eq!(
            options.volumes.get("/data").map(String::as_str),
            Some("/mnt/data")
        );
        assert_eq!(options.extra_flags, vec!["--privileged"]);
    }
}
