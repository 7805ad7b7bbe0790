//! A3 GPU replicated job builder

use launchpad_jobset::ReplicatedJobSpec;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{pod, BuildContext, ReplicatedJobBuilder};
use crate::config::{AcceleratorConfig, AcceleratorKind, GpuOptions};

pub const GPU_RESOURCE: &str = "nvidia.com/gpu";
pub const GPU_ACCELERATOR_SELECTOR: &str = "cloud.google.com/gke-accelerator";

/// Replicated job name used for GPU nodes
pub const GPU_REPLICATED_JOB: &str = "job";

/// Port process 0 listens on for distributed initialization
pub const COORDINATOR_PORT: u16 = 8080;

const SHARED_MEMORY_VOLUME: &str = "shared-memory";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuMachine {
    pub gke_accelerator: &'static str,
    pub gpus_per_node: u32,
}

static A3_MACHINES: &[(&str, GpuMachine)] = &[
    (
        "gpu-a3-highgpu-8g",
        GpuMachine {
            gke_accelerator: "nvidia-h100-80gb",
            gpus_per_node: 8,
        },
    ),
    (
        "gpu-a3-megagpu-8g",
        GpuMachine {
            gke_accelerator: "nvidia-h100-mega-80gb",
            gpus_per_node: 8,
        },
    ),
];

/// Look up an A3 machine type
pub fn a3_machine(instance_type: &str) -> Option<GpuMachine> {
    A3_MACHINES
        .iter()
        .find(|(name, _)| *name == instance_type)
        .map(|(_, machine)| *machine)
}

/// One indexed Job whose pods are the job's GPU nodes
#[derive(Clone, Debug)]
pub struct A3ReplicatedJob {
    ctx: BuildContext,
    machine: GpuMachine,
    num_nodes: u32,
    options: GpuOptions,
}

impl A3ReplicatedJob {
    pub fn new(
        ctx: BuildContext,
        accelerator: &AcceleratorConfig,
        options: GpuOptions,
    ) -> Result<Self, String> {
        let machine = a3_machine(&accelerator.instance_type)
            .ok_or_else(|| format!("unsupported GPU type: {}", accelerator.instance_type))?;
        Ok(Self {
            ctx,
            machine,
            num_nodes: accelerator.num_replicas,
            options,
        })
    }

    /// Address of process 0 through the JobSet headless service
    fn coordinator_address(&self) -> String {
        format!(
            "{name}-{rjob}-0-0.{name}:{port}",
            name = self.ctx.name,
            rjob = GPU_REPLICATED_JOB,
            port = COORDINATOR_PORT
        )
    }

    fn main_container(&self) -> Value {
        let ctx = &self.ctx;
        let env = pod::container_env(
            vec![
                pod::env_var("DISTRIBUTED_COORDINATOR", self.coordinator_address()),
                pod::env_var("NUM_PROCESSES", self.num_nodes.to_string()),
                pod::completion_index_env("PROCESS_ID"),
            ],
            ctx,
        );
        let mut mounts = vec![json!({"name": SHARED_MEMORY_VOLUME, "mountPath": "/dev/shm"})];
        mounts.extend(pod::output_mount(ctx));

        json!({
            "name": ctx.name,
            "image": ctx.image,
            "imagePullPolicy": "Always",
            "command": pod::main_command(ctx),
            "ports": [{"containerPort": COORDINATOR_PORT}],
            "securityContext": {"privileged": true},
            "resources": {"limits": {GPU_RESOURCE: self.machine.gpus_per_node.to_string()}},
            "env": env,
            "volumeMounts": mounts
        })
    }

    fn volumes(&self) -> Vec<Value> {
        let mut shm = json!({"medium": "Memory"});
        if let Some(limit) = &self.options.shm_size_limit {
            shm["sizeLimit"] = json!(limit);
        }
        let mut volumes = vec![json!({"name": SHARED_MEMORY_VOLUME, "emptyDir": shm})];
        volumes.extend(pod::output_volume(&self.ctx));
        volumes
    }

    fn pod_template(&self) -> Value {
        let ctx = &self.ctx;
        let selector = pod::node_selector(
            ctx,
            BTreeMap::from([(
                GPU_ACCELERATOR_SELECTOR.to_string(),
                self.machine.gke_accelerator.to_string(),
            )]),
        );
        json!({
            "metadata": {"labels": {"app": ctx.name}},
            "spec": {
                "serviceAccountName": ctx.service_account,
                "restartPolicy": "Never",
                "hostNetwork": true,
                "dnsPolicy": "ClusterFirstWithHostNet",
                "nodeSelector": selector,
                "tolerations": [{
                    "key": GPU_RESOURCE,
                    "operator": "Exists",
                    "effect": "NoSchedule"
                }],
                "containers": pod::containers(self.main_container(), ctx),
                "volumes": self.volumes()
            }
        })
    }
}

impl ReplicatedJobBuilder for A3ReplicatedJob {
    fn kind(&self) -> AcceleratorKind {
        AcceleratorKind::Gpu
    }

    fn build(&self) -> Vec<ReplicatedJobSpec> {
        vec![ReplicatedJobSpec(json!({
            "name": GPU_REPLICATED_JOB,
            "replicas": 1,
            "template": {
                "spec": {
                    "parallelism": self.num_nodes,
                    "completions": self.num_nodes,
                    "backoffLimit": 0,
                    "completionMode": "Indexed",
                    "template": self.pod_template()
                }
            }
        }))]
    }
}
