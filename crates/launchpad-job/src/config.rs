//! Job configuration
//!
//! A [`JobConfig`] is built once per submission attempt by [`JobConfigBuilder`],
//! which applies settings-derived defaults and rejects invalid combinations
//! before anything talks to a cluster or a VM.

use std::collections::BTreeMap;

use launchpad_common::kube_utils::validate_dns_label;
use launchpad_common::{SettingKey, SettingsResolver, DEFAULT_K8S_SERVICE_ACCOUNT, DEFAULT_NAMESPACE};
use launchpad_jobset::JobSetConfig;

use crate::builder;
use crate::error::JobError;

/// How the job's code is packaged
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Bundler {
    /// Container image pulled by every pod
    Docker { image: String },
    /// Source archive uploaded to object storage
    Archive { uri: String },
}

impl Bundler {
    pub fn image(&self) -> Option<&str> {
        match self {
            Bundler::Docker { image } => Some(image),
            Bundler::Archive { .. } => None,
        }
    }
}

/// Accelerator family a builder targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcceleratorKind {
    Tpu,
    Gpu,
}

impl AcceleratorKind {
    /// Accelerator family implied by an instance type prefix
    pub fn from_instance_type(instance_type: &str) -> Option<Self> {
        if instance_type.starts_with("tpu-") {
            Some(Self::Tpu)
        } else if instance_type.starts_with("gpu-") {
            Some(Self::Gpu)
        } else {
            None
        }
    }
}

impl std::fmt::Display for AcceleratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tpu => write!(f, "tpu"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceleratorConfig {
    /// e.g. `tpu-v5p-128` or `gpu-a3-highgpu-8g`
    pub instance_type: String,
    /// TPU slices or GPU nodes
    pub num_replicas: u32,
}

/// TPU builder options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TpuOptions {
    /// Schedule onto this capacity reservation
    pub reservation: Option<String>,
    /// Schedule onto spot capacity
    pub enable_spot: bool,
}

/// GPU builder options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GpuOptions {
    /// Size limit of the `/dev/shm` memory volume, e.g. `256Gi`
    pub shm_size_limit: Option<String>,
}

/// Replicated job variant and its options
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuilderOptions {
    Tpu(TpuOptions),
    Gpu(GpuOptions),
}

impl BuilderOptions {
    pub fn kind(&self) -> AcceleratorKind {
        match self {
            BuilderOptions::Tpu(_) => AcceleratorKind::Tpu,
            BuilderOptions::Gpu(_) => AcceleratorKind::Gpu,
        }
    }
}

/// Validated, immutable job descriptor
///
/// Only [`JobConfigBuilder::build`] creates one, so every instance has passed
/// validation. Use [`JobConfig::to_builder`] to derive a variant.
///
/// ```compile_fail
/// fn rename(config: &mut launchpad_job::JobConfig) {
///     config.name = "Not_A_Label".to_string();
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobConfig {
    name: String,
    command: String,
    project: String,
    zone: String,
    env_id: Option<String>,
    service_account: Option<String>,
    impersonate_account: Option<String>,
    impersonate_scopes: Vec<String>,
    bundler: Option<Bundler>,
    builder: Option<BuilderOptions>,
    accelerator: Option<AcceleratorConfig>,
    env_vars: BTreeMap<String, String>,
    namespace: String,
    queue: Option<String>,
    max_tries: u32,
    output_dir: Option<String>,
    enable_pre_provisioner: bool,
}

impl JobConfig {
    /// Start building a job configuration
    pub fn builder(name: impl Into<String>) -> JobConfigBuilder {
        JobConfigBuilder::new(name)
    }

    /// Builder pre-filled with this config's values, for deriving a variant
    pub fn to_builder(&self) -> JobConfigBuilder {
        JobConfigBuilder {
            name: self.name.clone(),
            command: self.command.clone(),
            project: Some(self.project.clone()),
            zone: Some(self.zone.clone()),
            env_id: self.env_id.clone(),
            service_account: self.service_account.clone(),
            impersonate_account: self.impersonate_account.clone(),
            impersonate_scopes: self.impersonate_scopes.clone(),
            bundler: self.bundler.clone(),
            builder: self.builder.clone(),
            accelerator: self.accelerator.clone(),
            env_vars: self.env_vars.clone(),
            namespace: Some(self.namespace.clone()),
            queue: self.queue.clone(),
            max_tries: self.max_tries,
            output_dir: self.output_dir.clone(),
            enable_pre_provisioner: self.enable_pre_provisioner,
        }
    }

    /// Job name, also the JobSet or VM name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn env_id(&self) -> Option<&str> {
        self.env_id.as_deref()
    }

    /// Kubernetes service account pods run as
    pub fn service_account(&self) -> Option<&str> {
        self.service_account.as_deref()
    }

    /// Identity used against the cluster API
    pub fn impersonate_account(&self) -> Option<&str> {
        self.impersonate_account.as_deref()
    }

    pub fn impersonate_scopes(&self) -> &[String] {
        &self.impersonate_scopes
    }

    pub fn bundler(&self) -> Option<&Bundler> {
        self.bundler.as_ref()
    }

    /// Replicated job variant, `None` for CPU VM jobs
    pub fn builder_options(&self) -> Option<&BuilderOptions> {
        self.builder.as_ref()
    }

    pub fn accelerator(&self) -> Option<&AcceleratorConfig> {
        self.accelerator.as_ref()
    }

    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env_vars
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn output_dir(&self) -> Option<&str> {
        self.output_dir.as_deref()
    }

    pub fn enable_pre_provisioner(&self) -> bool {
        self.enable_pre_provisioner
    }

    /// True when the job is submitted as a JobSet
    pub fn is_jobset(&self) -> bool {
        self.builder.is_some()
    }

    /// Image from the docker bundler
    pub fn image(&self) -> Option<&str> {
        self.bundler.as_ref().and_then(Bundler::image)
    }

    /// Compiler inputs for this job plus builder-specific annotations
    pub fn to_jobset_config(&self, annotations: BTreeMap<String, String>) -> JobSetConfig {
        JobSetConfig {
            name: self.name.clone(),
            max_tries: self.max_tries,
            queue: self.queue.clone(),
            annotations,
        }
    }
}

/// Builder for [`JobConfig`]
///
/// | option | effect |
/// |---|---|
/// | `command` | command run by every replica / on the VM |
/// | `project`, `zone`, `env_id` | cloud identity; defaulted from settings |
/// | `service_account` | pod identity; defaulted from `k8s_service_account`, then `default` |
/// | `impersonate_account`, `impersonate_scopes` | identity used for cluster API calls |
/// | `bundler` | must be docker for JobSet jobs |
/// | `builder` | TPU or GPU replicated job variant; absent for CPU VM jobs |
/// | `accelerator` | instance type and replica count, checked against `builder` |
/// | `env_var` | added to every main container |
/// | `namespace` | defaults to `default` |
/// | `queue` | Kueue queue annotation, opt-in |
/// | `max_tries` | total attempts, at least 1 |
/// | `output_dir` | adds the output uploader sidecar |
/// | `enable_pre_provisioner` | adds the pre-provisioner node selector |
#[derive(Clone, Debug)]
pub struct JobConfigBuilder {
    name: String,
    command: String,
    project: Option<String>,
    zone: Option<String>,
    env_id: Option<String>,
    service_account: Option<String>,
    impersonate_account: Option<String>,
    impersonate_scopes: Vec<String>,
    bundler: Option<Bundler>,
    builder: Option<BuilderOptions>,
    accelerator: Option<AcceleratorConfig>,
    env_vars: BTreeMap<String, String>,
    namespace: Option<String>,
    queue: Option<String>,
    max_tries: u32,
    output_dir: Option<String>,
    enable_pre_provisioner: bool,
}

impl JobConfigBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: String::new(),
            project: None,
            zone: None,
            env_id: None,
            service_account: None,
            impersonate_account: None,
            impersonate_scopes: Vec::new(),
            bundler: None,
            builder: None,
            accelerator: None,
            env_vars: BTreeMap::new(),
            namespace: None,
            queue: None,
            max_tries: 1,
            output_dir: None,
            enable_pre_provisioner: false,
        }
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn env_id(mut self, env_id: impl Into<String>) -> Self {
        self.env_id = Some(env_id.into());
        self
    }

    pub fn service_account(mut self, service_account: impl Into<String>) -> Self {
        self.service_account = Some(service_account.into());
        self
    }

    pub fn impersonate_account(mut self, account: impl Into<String>) -> Self {
        self.impersonate_account = Some(account.into());
        self
    }

    pub fn impersonate_scopes(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.impersonate_scopes = scopes.into_iter().collect();
        self
    }

    pub fn bundler(mut self, bundler: Bundler) -> Self {
        self.bundler = Some(bundler);
        self
    }

    pub fn docker_image(self, image: impl Into<String>) -> Self {
        self.bundler(Bundler::Docker {
            image: image.into(),
        })
    }

    pub fn builder(mut self, builder: BuilderOptions) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn accelerator(mut self, instance_type: impl Into<String>, num_replicas: u32) -> Self {
        self.accelerator = Some(AcceleratorConfig {
            instance_type: instance_type.into(),
            num_replicas,
        });
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn output_dir(mut self, output_dir: impl Into<String>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn enable_pre_provisioner(mut self, enable: bool) -> Self {
        self.enable_pre_provisioner = enable;
        self
    }

    /// Resolve defaults from `settings` and validate.
    ///
    /// Explicit values always win over settings.
    pub fn build(self, settings: &dyn SettingsResolver) -> Result<JobConfig, JobError> {
        let name = self.name;
        if name.is_empty() {
            return Err(JobError::config("<unnamed>", "job name is required"));
        }
        if self.max_tries == 0 {
            return Err(JobError::config(&name, "max_tries must be at least 1"));
        }

        let project = self
            .project
            .or_else(|| settings.get(SettingKey::Project))
            .ok_or_else(|| JobError::config(&name, "project is required"))?;
        let zone = self
            .zone
            .or_else(|| settings.get(SettingKey::Zone))
            .ok_or_else(|| JobError::config(&name, "zone is required"))?;
        let env_id = self.env_id.or_else(|| settings.get(SettingKey::EnvId));

        let service_account = match &self.builder {
            Some(builder) => {
                validate_dns_label(&name, "job name").map_err(|e| JobError::config(&name, e))?;
                match &self.bundler {
                    Some(Bundler::Docker { image }) if !image.is_empty() => {}
                    Some(Bundler::Docker { .. }) => {
                        return Err(JobError::config(&name, "docker bundler requires an image"))
                    }
                    other => {
                        return Err(JobError::config(
                            &name,
                            format!("only docker bundler supported, got: {:?}", other),
                        ))
                    }
                }
                let accelerator = self.accelerator.as_ref().ok_or_else(|| {
                    JobError::config(&name, format!("{} jobs require an accelerator", builder.kind()))
                })?;
                if accelerator.num_replicas == 0 {
                    return Err(JobError::config(&name, "num_replicas must be at least 1"));
                }
                builder::validate_accelerator(builder, accelerator)
                    .map_err(|e| JobError::config(&name, e))?;

                Some(
                    self.service_account
                        .or_else(|| settings.get(SettingKey::K8sServiceAccount))
                        .unwrap_or_else(|| DEFAULT_K8S_SERVICE_ACCOUNT.to_string()),
                )
            }
            None => {
                if self.accelerator.is_some() {
                    return Err(JobError::config(
                        &name,
                        "accelerator requires a TPU or GPU builder",
                    ));
                }
                self.service_account
            }
        };

        Ok(JobConfig {
            name,
            command: self.command,
            project,
            zone,
            env_id,
            service_account,
            impersonate_account: self.impersonate_account,
            impersonate_scopes: self.impersonate_scopes,
            bundler: self.bundler,
            builder: self.builder,
            accelerator: self.accelerator,
            env_vars: self.env_vars,
            namespace: self
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            queue: self.queue,
            max_tries: self.max_tries,
            output_dir: self.output_dir,
            enable_pre_provisioner: self.enable_pre_provisioner,
        })
    }
}
