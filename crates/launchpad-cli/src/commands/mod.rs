//! CLI commands

use std::path::Path;

use clap::{Args, ValueEnum};
use serde_json::Value;

use launchpad_common::DEFAULT_NAMESPACE;
use launchpad_job::{BuilderOptions, JobConfig, JobConfigBuilder};

use crate::config::load_settings;
use crate::Result;

pub mod cpu;
pub mod docker;
pub mod jobset;

/// Flags shared by every JobSet job
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Job name, also the JobSet name
    #[arg(long)]
    pub name: String,

    /// Command run by every replica
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

    /// Service account pods run as (defaults to the `k8s_service_account` setting)
    #[arg(long)]
    pub service_account: Option<String>,

    /// Service account to impersonate for cluster API calls
    #[arg(long)]
    pub impersonate_account: Option<String>,

    /// Groups requested with the impersonated account
    #[arg(long, value_delimiter = ',')]
    pub impersonate_scopes: Vec<String>,

    /// Docker image containing the job's code
    #[arg(long)]
    pub image: Option<String>,

    /// Accelerator instance type, e.g. tpu-v5p-128 or gpu-a3-highgpu-8g
    #[arg(long)]
    pub instance_type: String,

    /// TPU slices or GPU nodes
    #[arg(long, default_value_t = 1)]
    pub num_replicas: u32,

    /// Environment variable for the main container (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_key_val)]
    pub env_vars: Vec<(String, String)>,

    #[arg(long, short = 'n', default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Kueue LocalQueue to submit into; no queue when unset
    #[arg(long)]
    pub queue: Option<String>,

    /// Total attempts before the JobSet fails
    #[arg(long, default_value_t = 1)]
    pub max_tries: u32,

    /// Object storage prefix that per-host outputs are synced to
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Pin pods to nodes created by the pre-provisioner
    #[arg(long)]
    pub enable_pre_provisioner: bool,
}

impl JobArgs {
    /// Translate flags into a config builder for the given variant
    pub fn into_builder(self, options: BuilderOptions) -> JobConfigBuilder {
        let mut builder = JobConfig::builder(self.name)
            .command(self.command)
            .builder(options)
            .accelerator(self.instance_type, self.num_replicas)
            .namespace(self.namespace)
            .max_tries(self.max_tries)
            .enable_pre_provisioner(self.enable_pre_provisioner)
            .impersonate_scopes(self.impersonate_scopes);
        if let Some(project) = self.project {
            builder = builder.project(project);
        }
        if let Some(zone) = self.zone {
            builder = builder.zone(zone);
        }
        if let Some(env_id) = self.env_id {
            builder = builder.env_id(env_id);
        }
        if let Some(sa) = self.service_account {
            builder = builder.service_account(sa);
        }
        if let Some(account) = self.impersonate_account {
            builder = builder.impersonate_account(account);
        }
        if let Some(image) = self.image {
            builder = builder.docker_image(image);
        }
        if let Some(queue) = self.queue {
            builder = builder.queue(queue);
        }
        if let Some(output_dir) = self.output_dir {
            builder = builder.output_dir(output_dir);
        }
        for (key, value) in self.env_vars {
            builder = builder.env_var(key, value);
        }
        builder
    }

    /// Build a validated job config, resolving defaults from settings
    pub fn into_config(self, options: BuilderOptions, settings: Option<&Path>) -> Result<JobConfig> {
        let resolver = load_settings(settings, self.env_id.clone())?;
        Ok(self.into_builder(options).build(&resolver)?)
    }
}

/// Output format for printed documents
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Print a document to stdout
pub fn print_document(value: &Value, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Parse `KEY=VALUE`
pub fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got: {}", s)),
    }
}

/// Parse `SRC:DST`
pub fn parse_volume(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once(':') {
        Some((src, dst)) if !src.is_empty() && !dst.is_empty() => {
            Ok((src.to_string(), dst.to_string()))
        }
        _ => Err(format!("expected SRC:DST, got: {}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_common::{SettingKey, StaticSettings};
    use launchpad_job::TpuOptions;
    use rstest::rstest;

    fn args() -> JobArgs {
        JobArgs {
            name: "job1".to_string(),
            command: "python train.py".to_string(),
            project: None,
            zone: None,
            env_id: None,
            service_account: None,
            impersonate_account: Some("ml:launcher".to_string()),
            impersonate_scopes: vec!["system:authenticated".to_string()],
            image: Some("trainer:latest".to_string()),
            instance_type: "tpu-v5p-8".to_string(),
            num_replicas: 2,
            env_vars: vec![("LOG_LEVEL".to_string(), "debug".to_string())],
            namespace: "ml".to_string(),
            queue: Some("q1".to_string()),
            max_tries: 3,
            output_dir: None,
            enable_pre_provisioner: false,
        }
    }

    #[test]
    fn flags_map_onto_job_config() {
        let settings = StaticSettings::new()
            .with(SettingKey::Project, "p")
            .with(SettingKey::Zone, "z");
        let config = args()
            .into_builder(BuilderOptions::Tpu(TpuOptions::default()))
            .build(&settings)
            .unwrap();

        assert_eq!(config.name(), "job1");
        assert_eq!(config.project(), "p");
        assert_eq!(config.namespace(), "ml");
        assert_eq!(config.max_tries(), 3);
        assert_eq!(config.queue(), Some("q1"));
        assert_eq!(config.image(), Some("trainer:latest"));
        assert_eq!(config.impersonate_account(), Some("ml:launcher"));
        assert_eq!(config.impersonate_scopes(), vec!["system:authenticated"]);
        assert_eq!(config.accelerator().unwrap().num_replicas, 2);
        assert_eq!(
            config.env_vars().get("LOG_LEVEL").map(String::as_str),
            Some("debug")
        );
    }

    #[rstest]
    #[case("A=1", Ok(("A", "1")))]
    #[case("A=", Ok(("A", "")))]
    #[case("A=b=c", Ok(("A", "b=c")))]
    #[case("=1", Err(()))]
    #[case("A", Err(()))]
    fn key_val_parsing(#[case] input: &str, #[case] expected: std::result::Result<(&str, &str), ()>) {
        let parsed = parse_key_val(input);
        match expected {
            Ok((k, v)) => assert_eq!(parsed.unwrap(), (k.to_string(), v.to_string())),
            Err(()) => assert!(parsed.is_err()),
        }
    }

    #[test]
    fn volume_parsing() {
        assert_eq!(
            parse_volume("/tmp/data:/data").unwrap(),
            ("/tmp/data".to_string(), "/data".to_string())
        );
        assert!(parse_volume("/tmp/data").is_err());
        assert!(parse_volume(":/data").is_err());
    }
}
