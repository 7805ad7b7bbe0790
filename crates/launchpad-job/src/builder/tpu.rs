//! TPU replicated job builder
//!
//! A TPU job is one replicated job with one replica per slice. Each replica is
//! an indexed Job with one pod per VM of the slice, and every pod claims all
//! chips of its VM.

use std::collections::BTreeMap;

use launchpad_jobset::{ReplicatedJobSpec, EXCLUSIVE_TOPOLOGY_ANNOTATION, GKE_NODEPOOL_TOPOLOGY};
use serde_json::{json, Value};

use super::{pod, BuildContext, ReplicatedJobBuilder};
use crate::config::{AcceleratorConfig, AcceleratorKind, TpuOptions};

pub const TPU_RESOURCE: &str = "google.com/tpu";
pub const TPU_ACCELERATOR_SELECTOR: &str = "cloud.google.com/gke-tpu-accelerator";
pub const TPU_TOPOLOGY_SELECTOR: &str = "cloud.google.com/gke-tpu-topology";
pub const RESERVATION_SELECTOR: &str = "cloud.google.com/reservation-name";
pub const SPOT_SELECTOR: &str = "cloud.google.com/gke-spot";

/// Replicated job name used for TPU slices
pub const TPU_REPLICATED_JOB: &str = "job";

/// Ports used by the TPU runtime and worker coordination
pub const TPU_PORTS: [u16; 3] = [8471, 8080, 8431];

/// Slice shape of a TPU instance type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TpuTopology {
    /// GKE accelerator node label value
    pub gke_accelerator: &'static str,
    pub topology: &'static str,
    pub chips_per_vm: u32,
    pub vms_per_slice: u32,
}

const fn slice(
    gke_accelerator: &'static str,
    topology: &'static str,
    chips_per_vm: u32,
    vms_per_slice: u32,
) -> TpuTopology {
    TpuTopology {
        gke_accelerator,
        topology,
        chips_per_vm,
        vms_per_slice,
    }
}

const V4: &str = "tpu-v4-podslice";
const V5E: &str = "tpu-v5-lite-podslice";
const V5P: &str = "tpu-v5p-slice";
const V6E: &str = "tpu-v6e-slice";

static TPU_TOPOLOGIES: &[(&str, TpuTopology)] = &[
    ("tpu-v4-8", slice(V4, "2x2x1", 4, 1)),
    ("tpu-v4-16", slice(V4, "2x2x2", 4, 2)),
    ("tpu-v4-32", slice(V4, "2x2x4", 4, 4)),
    ("tpu-v4-64", slice(V4, "2x4x4", 4, 8)),
    ("tpu-v4-128", slice(V4, "4x4x4", 4, 16)),
    ("tpu-v4-256", slice(V4, "4x4x8", 4, 32)),
    ("tpu-v4-512", slice(V4, "4x8x8", 4, 64)),
    ("tpu-v5litepod-1", slice(V5E, "1x1", 1, 1)),
    ("tpu-v5litepod-4", slice(V5E, "2x2", 4, 1)),
    ("tpu-v5litepod-8", slice(V5E, "2x4", 8, 1)),
    ("tpu-v5litepod-16", slice(V5E, "4x4", 4, 4)),
    ("tpu-v5litepod-32", slice(V5E, "4x8", 4, 8)),
    ("tpu-v5litepod-64", slice(V5E, "8x8", 4, 16)),
    ("tpu-v5litepod-128", slice(V5E, "8x16", 4, 32)),
    ("tpu-v5litepod-256", slice(V5E, "16x16", 4, 64)),
    ("tpu-v5p-8", slice(V5P, "2x2x1", 4, 1)),
    ("tpu-v5p-16", slice(V5P, "2x2x2", 4, 2)),
    ("tpu-v5p-32", slice(V5P, "2x2x4", 4, 4)),
    ("tpu-v5p-64", slice(V5P, "2x4x4", 4, 8)),
    ("tpu-v5p-128", slice(V5P, "4x4x4", 4, 16)),
    ("tpu-v5p-256", slice(V5P, "4x4x8", 4, 32)),
    ("tpu-v5p-512", slice(V5P, "4x8x8", 4, 64)),
    ("tpu-v5p-1024", slice(V5P, "8x8x8", 4, 128)),
    ("tpu-v6e-1", slice(V6E, "1x1", 1, 1)),
    ("tpu-v6e-4", slice(V6E, "2x2", 4, 1)),
    ("tpu-v6e-8", slice(V6E, "2x4", 8, 1)),
    ("tpu-v6e-16", slice(V6E, "4x4", 4, 4)),
    ("tpu-v6e-32", slice(V6E, "4x8", 4, 8)),
    ("tpu-v6e-64", slice(V6E, "8x8", 4, 16)),
    ("tpu-v6e-128", slice(V6E, "8x16", 4, 32)),
    ("tpu-v6e-256", slice(V6E, "16x16", 4, 64)),
];

/// Look up the slice shape of a TPU instance type
pub fn tpu_topology(instance_type: &str) -> Option<TpuTopology> {
    TPU_TOPOLOGIES
        .iter()
        .find(|(name, _)| *name == instance_type)
        .map(|(_, topology)| *topology)
}

pub fn validate_options(options: &TpuOptions) -> Result<(), String> {
    if options.reservation.is_some() && options.enable_spot {
        return Err("reservation and spot capacity are mutually exclusive".to_string());
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct TpuReplicatedJob {
    ctx: BuildContext,
    topology: TpuTopology,
    num_slices: u32,
    options: TpuOptions,
}

impl TpuReplicatedJob {
    pub fn new(
        ctx: BuildContext,
        accelerator: &AcceleratorConfig,
        options: TpuOptions,
    ) -> Result<Self, String> {
        let topology = tpu_topology(&accelerator.instance_type)
            .ok_or_else(|| format!("unknown TPU type: {}", accelerator.instance_type))?;
        validate_options(&options)?;
        Ok(Self {
            ctx,
            topology,
            num_slices: accelerator.num_replicas,
            options,
        })
    }

    fn node_selector(&self) -> BTreeMap<String, String> {
        let mut selector = BTreeMap::from([
            (
                TPU_ACCELERATOR_SELECTOR.to_string(),
                self.topology.gke_accelerator.to_string(),
            ),
            (
                TPU_TOPOLOGY_SELECTOR.to_string(),
                self.topology.topology.to_string(),
            ),
        ]);
        if let Some(reservation) = &self.options.reservation {
            selector.insert(RESERVATION_SELECTOR.to_string(), reservation.clone());
        }
        if self.options.enable_spot {
            selector.insert(SPOT_SELECTOR.to_string(), "true".to_string());
        }
        pod::node_selector(&self.ctx, selector)
    }

    fn tolerations(&self) -> Vec<Value> {
        let mut tolerations = vec![json!({
            "key": TPU_RESOURCE,
            "operator": "Equal",
            "value": "present",
            "effect": "NoSchedule"
        })];
        if self.options.enable_spot {
            tolerations.push(json!({
                "key": SPOT_SELECTOR,
                "operator": "Equal",
                "value": "true",
                "effect": "NoSchedule"
            }));
        }
        tolerations
    }

    fn main_container(&self) -> Value {
        let ctx = &self.ctx;
        let env = pod::container_env(
            vec![pod::env_var("NUM_TPU_SLICES", self.num_slices.to_string())],
            ctx,
        );
        let ports: Vec<Value> = TPU_PORTS
            .iter()
            .map(|port| json!({"containerPort": port}))
            .collect();
        let chips = self.topology.chips_per_vm.to_string();

        json!({
            "name": ctx.name,
            "image": ctx.image,
            "imagePullPolicy": "Always",
            "command": pod::main_command(ctx),
            "ports": ports,
            "securityContext": {"privileged": true},
            "resources": {"limits": {TPU_RESOURCE: chips}},
            "env": env,
            "volumeMounts": pod::output_mount(ctx).into_iter().collect::<Vec<_>>()
        })
    }

    fn pod_template(&self) -> Value {
        let ctx = &self.ctx;
        json!({
            "metadata": {"labels": {"app": ctx.name}},
            "spec": {
                "serviceAccountName": ctx.service_account,
                "restartPolicy": "Never",
                "hostNetwork": true,
                "dnsPolicy": "ClusterFirstWithHostNet",
                "nodeSelector": self.node_selector(),
                "tolerations": self.tolerations(),
                "containers": pod::containers(self.main_container(), ctx),
                "volumes": pod::output_volume(ctx).into_iter().collect::<Vec<_>>()
            }
        })
    }
}

impl ReplicatedJobBuilder for TpuReplicatedJob {
    fn kind(&self) -> AcceleratorKind {
        AcceleratorKind::Tpu
    }

    fn build(&self) -> Vec<ReplicatedJobSpec> {
        let vms = self.topology.vms_per_slice;
        vec![ReplicatedJobSpec(json!({
            "name": TPU_REPLICATED_JOB,
            "replicas": self.num_slices,
            "template": {
                "spec": {
                    "parallelism": vms,
                    "completions": vms,
                    "backoffLimit": 0,
                    "completionMode": "Indexed",
                    "template": self.pod_template()
                }
            }
        }))]
    }

    fn jobset_annotations(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            EXCLUSIVE_TOPOLOGY_ANNOTATION.to_string(),
            GKE_NODEPOOL_TOPOLOGY.to_string(),
        )])
    }
}
