//! Job lifecycle control
//!
//! JobSet jobs are compiled and created on `execute` and deleted with
//! foreground propagation on `delete`. Neither call waits for the cluster to
//! act, and nothing is retried: a failed create is surfaced as-is.
//!
//! CPU VM jobs never touch the cluster; `execute` runs the job's command on the
//! VM over SSH.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::discovery::ApiResource;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use launchpad_common::kube_utils::discover_jobset;
use launchpad_common::{CredentialProvider, Credentials};
use launchpad_jobset::{build_jobset, JobSetDocument};

use crate::builder::{builder_for, ReplicatedJobBuilder};
use crate::command::{ssh_command, RemoteTarget, DEFAULT_SSH_TOOL};
use crate::config::JobConfig;
use crate::error::JobError;
use crate::runner::{CommandOutput, RemoteRunner};

/// Cluster operations on JobSet resources
///
/// Abstracted so lifecycle behavior can be tested without a cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobSetApi: Send + Sync {
    /// Resolve the JobSet resource served by the cluster, `None` if the CRD is absent
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<ApiResource>, kube::Error>;

    async fn create(
        &self,
        credentials: &Credentials,
        namespace: &str,
        resource: &ApiResource,
        body: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;

    /// Request deletion with foreground propagation
    async fn delete(
        &self,
        credentials: &Credentials,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
    ) -> Result<(), kube::Error>;
}

/// [`JobSetApi`] backed by kube-rs, building a client from each call's credentials
#[derive(Clone, Debug, Default)]
pub struct KubeJobSetApi;

#[async_trait]
impl JobSetApi for KubeJobSetApi {
    async fn resolve(&self, credentials: &Credentials) -> Result<Option<ApiResource>, kube::Error> {
        let client = credentials.client()?;
        Ok(discover_jobset(&client).await)
    }

    async fn create(
        &self,
        credentials: &Credentials,
        namespace: &str,
        resource: &ApiResource,
        body: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(credentials.client()?, namespace, resource);
        api.create(&PostParams::default(), body).await
    }

    async fn delete(
        &self,
        credentials: &Credentials,
        namespace: &str,
        resource: &ApiResource,
        name: &str,
    ) -> Result<(), kube::Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(credentials.client()?, namespace, resource);
        api.delete(name, &DeleteParams::foreground()).await?;
        Ok(())
    }
}

/// Result of a delete request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Accepted; descendants may still be terminating
    Requested,
    /// Nothing to delete
    NotFound,
}

/// Job submitted to the cluster as a JobSet
pub struct GkeJob {
    config: JobConfig,
    builder: Box<dyn ReplicatedJobBuilder>,
    credentials: Arc<dyn CredentialProvider>,
    api: Arc<dyn JobSetApi>,
}

impl std::fmt::Debug for GkeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GkeJob")
            .field("config", &self.config)
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl GkeJob {
    /// Create a JobSet job, selecting its builder from `config.builder`.
    ///
    /// Fails with [`JobError::Config`] when the builder is missing or the
    /// bundler is not docker.
    pub fn new(
        config: JobConfig,
        credentials: Arc<dyn CredentialProvider>,
        api: Arc<dyn JobSetApi>,
    ) -> Result<Self, JobError> {
        let builder = builder_for(&config)?;
        Ok(Self::with_builder(config, builder, credentials, api))
    }

    /// Create a JobSet job around a caller-supplied replicated job builder
    pub fn with_builder(
        config: JobConfig,
        builder: Box<dyn ReplicatedJobBuilder>,
        credentials: Arc<dyn CredentialProvider>,
        api: Arc<dyn JobSetApi>,
    ) -> Self {
        Self {
            config,
            builder,
            credentials,
            api,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Compile the JobSet document without contacting the cluster
    pub fn build_jobset(&self) -> Result<JobSetDocument, JobError> {
        let jobset_config = self
            .config
            .to_jobset_config(self.builder.jobset_annotations());
        Ok(build_jobset(&jobset_config, self.builder.build())?)
    }

    async fn job_credentials(&self) -> Result<Credentials, JobError> {
        let credentials = self
            .credentials
            .get_credentials(
                self.config.impersonate_account().map(str::to_string),
                self.config.impersonate_scopes().to_vec(),
            )
            .await?;
        Ok(credentials)
    }

    /// Submit the JobSet and return the cluster's creation response
    pub async fn execute(&self) -> Result<DynamicObject, JobError> {
        let name = self.config.name();
        let namespace = self.config.namespace();
        let document = self.build_jobset()?;

        let credentials = self.job_credentials().await?;
        let resource = self
            .api
            .resolve(&credentials)
            .await
            .map_err(|source| JobError::Submission {
                job: name.to_string(),
                source,
            })?
            .ok_or_else(|| JobError::JobSetCrdMissing { job: name.to_string() })?;

        let body = serde_json::to_value(document.into_resource(resource.api_version.clone()))?;
        info!(
            job = %name,
            namespace = %namespace,
            api_version = %resource.api_version,
            body = %body,
            "submitting JobSet"
        );
        let object: DynamicObject = serde_json::from_value(body)?;

        let created = self
            .api
            .create(&credentials, namespace, &resource, &object)
            .await
            .map_err(|source| JobError::Submission {
                job: name.to_string(),
                source,
            })?;
        info!(job = %name, namespace = %namespace, "JobSet created");
        Ok(created)
    }

    /// Request deletion of the JobSet and its descendants
    pub async fn delete(&self) -> Result<DeleteOutcome, JobError> {
        delete_jobset(
            &JobSetRef::from(&self.config),
            self.credentials.as_ref(),
            self.api.as_ref(),
        )
        .await
    }
}

/// A JobSet addressed for deletion, with the identity used to delete it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSetRef {
    pub name: String,
    pub namespace: String,
    pub impersonate_account: Option<String>,
    pub impersonate_scopes: Vec<String>,
}

impl From<&JobConfig> for JobSetRef {
    fn from(config: &JobConfig) -> Self {
        Self {
            name: config.name().to_string(),
            namespace: config.namespace().to_string(),
            impersonate_account: config.impersonate_account().map(str::to_string),
            impersonate_scopes: config.impersonate_scopes().to_vec(),
        }
    }
}

/// Request deletion of a JobSet and its descendants.
///
/// Returns once the request is accepted. A JobSet that does not exist, or a
/// cluster without the JobSet CRD, yields [`DeleteOutcome::NotFound`].
pub async fn delete_jobset(
    target: &JobSetRef,
    credentials: &dyn CredentialProvider,
    api: &dyn JobSetApi,
) -> Result<DeleteOutcome, JobError> {
    let name = &target.name;
    let namespace = &target.namespace;
    let credentials = credentials
        .get_credentials(
            target.impersonate_account.clone(),
            target.impersonate_scopes.clone(),
        )
        .await?;

    let resource = match api.resolve(&credentials).await {
        Ok(Some(resource)) => resource,
        Ok(None) => {
            warn!(job = %name, "JobSet CRD not installed, nothing to delete");
            return Ok(DeleteOutcome::NotFound);
        }
        Err(source) => {
            return Err(JobError::Deletion {
                job: name.clone(),
                source,
            })
        }
    };

    match api.delete(&credentials, namespace, &resource, name).await {
        Ok(()) => {
            info!(job = %name, namespace = %namespace, "JobSet deletion requested");
            Ok(DeleteOutcome::Requested)
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!(job = %name, namespace = %namespace, "JobSet already gone");
            Ok(DeleteOutcome::NotFound)
        }
        Err(source) => Err(JobError::Deletion {
            job: name.clone(),
            source,
        }),
    }
}

/// Job run directly on an existing VM
pub struct CpuJob {
    config: JobConfig,
    runner: Arc<dyn RemoteRunner>,
    ssh_tool: String,
    detached_session: Option<String>,
}

impl std::fmt::Debug for CpuJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuJob")
            .field("config", &self.config)
            .field("ssh_tool", &self.ssh_tool)
            .field("detached_session", &self.detached_session)
            .finish_non_exhaustive()
    }
}

impl CpuJob {
    pub fn new(config: JobConfig, runner: Arc<dyn RemoteRunner>) -> Self {
        Self {
            config,
            runner,
            ssh_tool: DEFAULT_SSH_TOOL.to_string(),
            detached_session: None,
        }
    }

    pub fn with_ssh_tool(mut self, ssh_tool: impl Into<String>) -> Self {
        self.ssh_tool = ssh_tool.into();
        self
    }

    /// Run `execute` inside a detached `screen` session of this name
    pub fn with_detached_session(mut self, session: impl Into<String>) -> Self {
        self.detached_session = Some(session.into());
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    fn target(&self) -> RemoteTarget {
        RemoteTarget {
            ssh_tool: self.ssh_tool.clone(),
            name: self.config.name().to_string(),
            project: self.config.project().to_string(),
            zone: self.config.zone().to_string(),
        }
    }

    /// Run a command on the VM, failing with [`JobError::RemoteExec`] on a
    /// non-zero exit.
    pub async fn execute_remote_cmd(
        &self,
        cmd: &str,
        detached_session: Option<&str>,
    ) -> Result<CommandOutput, JobError> {
        debug!(vm = %self.config.name(), command = %cmd, "executing remote command");
        let line = ssh_command(&self.target(), cmd, detached_session);
        let output = self.runner.run(&line).await?;
        if !output.success() {
            return Err(JobError::RemoteExec {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        debug!(vm = %self.config.name(), "finished remote command");
        Ok(output)
    }

    /// Run the job's command on the VM
    pub async fn execute(&self) -> Result<CommandOutput, JobError> {
        self.execute_remote_cmd(self.config.command(), self.detached_session.as_deref())
            .await
    }
}

/// Result of [`Job::execute`]
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// JobSet accepted by the cluster
    Submitted(DynamicObject),
    /// Command finished on the VM
    Ran(CommandOutput),
}

/// A job of any kind, dispatched on whether its config names a builder
#[derive(Debug)]
pub enum Job {
    JobSet(GkeJob),
    Vm(CpuJob),
}

impl Job {
    pub fn new(
        config: JobConfig,
        credentials: Arc<dyn CredentialProvider>,
        api: Arc<dyn JobSetApi>,
        runner: Arc<dyn RemoteRunner>,
    ) -> Result<Self, JobError> {
        if config.is_jobset() {
            Ok(Job::JobSet(GkeJob::new(config, credentials, api)?))
        } else {
            Ok(Job::Vm(CpuJob::new(config, runner)))
        }
    }

    pub fn config(&self) -> &JobConfig {
        match self {
            Job::JobSet(job) => job.config(),
            Job::Vm(job) => job.config(),
        }
    }

    pub async fn execute(&self) -> Result<ExecuteOutcome, JobError> {
        match self {
            Job::JobSet(job) => job.execute().await.map(ExecuteOutcome::Submitted),
            Job::Vm(job) => job.execute().await.map(ExecuteOutcome::Ran),
        }
    }

    pub async fn delete(&self) -> Result<DeleteOutcome, JobError> {
        match self {
            Job::JobSet(job) => job.delete().await,
            Job::Vm(job) => Err(JobError::config(
                job.config().name(),
                "VM jobs have no cluster resources to delete",
            )),
        }
    }

    /// Annotations of the JobSet this job would submit, empty for VM jobs
    pub fn jobset_annotations(&self) -> Result<BTreeMap<String, String>, JobError> {
        match self {
            Job::JobSet(job) => Ok(job.build_jobset()?.metadata.annotations),
            Job::Vm(_) => Ok(BTreeMap::new()),
        }
    }
}
