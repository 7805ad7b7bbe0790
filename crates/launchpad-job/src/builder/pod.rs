//! Pod template pieces shared by all builders

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::BuildContext;
use crate::command::shell_quote;

/// Node label the pre-provisioner matches on
pub const PRE_PROVISIONER_LABEL: &str = "pre-provisioner-id";

/// Annotation carrying a pod's index within an indexed Job
pub const COMPLETION_INDEX_ANNOTATION: &str = "batch.kubernetes.io/job-completion-index";

pub const SHARED_OUTPUT_VOLUME: &str = "shared-output";
pub const OUTPUT_MOUNT_PATH: &str = "/output";
pub const OUTPUT_UPLOADER_CONTAINER: &str = "output-uploader";
pub const OUTPUT_UPLOADER_IMAGE: &str = "google/cloud-sdk:alpine";
pub const OUTPUT_SYNC_INTERVAL_SECS: u32 = 60;

/// `{"name": .., "value": ..}` env entry
pub fn env_var(name: &str, value: impl Into<String>) -> Value {
    json!({"name": name, "value": value.into()})
}

/// Env entry read from the pod's completion index
pub fn completion_index_env(name: &str) -> Value {
    json!({
        "name": name,
        "valueFrom": {
            "fieldRef": {
                "fieldPath": format!("metadata.annotations['{}']", COMPLETION_INDEX_ANNOTATION)
            }
        }
    })
}

/// Builder env followed by the job's env vars in key order
pub fn container_env(builder_env: Vec<Value>, ctx: &BuildContext) -> Vec<Value> {
    let mut env = builder_env;
    env.extend(ctx.env_vars.iter().map(|(k, v)| env_var(k, v.as_str())));
    env
}

/// Command for the main container
pub fn main_command(ctx: &BuildContext) -> Value {
    json!(["bash", "-c", ctx.command])
}

/// Node selector with the pre-provisioner label added when enabled
pub fn node_selector(
    ctx: &BuildContext,
    mut selector: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    if ctx.enable_pre_provisioner {
        selector.insert(PRE_PROVISIONER_LABEL.to_string(), ctx.name.clone());
    }
    selector
}

/// Mount of the shared output volume, if outputs are uploaded
pub fn output_mount(ctx: &BuildContext) -> Option<Value> {
    ctx.output_dir.as_ref().map(|_| {
        json!({"name": SHARED_OUTPUT_VOLUME, "mountPath": OUTPUT_MOUNT_PATH})
    })
}

/// Shared output volume, if outputs are uploaded
pub fn output_volume(ctx: &BuildContext) -> Option<Value> {
    ctx.output_dir
        .as_ref()
        .map(|_| json!({"name": SHARED_OUTPUT_VOLUME, "emptyDir": {}}))
}

/// Sidecar syncing `/output/$HOSTNAME/` to `<output_dir>/output/$HOSTNAME/`
pub fn output_uploader(ctx: &BuildContext) -> Option<Value> {
    let output_dir = ctx.output_dir.as_ref()?;
    let src = format!("{}/$HOSTNAME/", OUTPUT_MOUNT_PATH);
    let dst = format!("{}/output/$HOSTNAME/", shell_quote(output_dir.trim_end_matches('/')));
    let script = format!(
        "mkdir -p {src}; while true; do gsutil -m rsync -r {src} {dst}; sleep {interval}; done",
        src = src,
        dst = dst,
        interval = OUTPUT_SYNC_INTERVAL_SECS
    );
    Some(json!({
        "name": OUTPUT_UPLOADER_CONTAINER,
        "image": OUTPUT_UPLOADER_IMAGE,
        "command": ["/bin/sh", "-c", script],
        "volumeMounts": [{"name": SHARED_OUTPUT_VOLUME, "mountPath": OUTPUT_MOUNT_PATH}]
    }))
}

/// Main container followed by the uploader sidecar, if any
pub fn containers(main: Value, ctx: &BuildContext) -> Vec<Value> {
    let mut containers = vec![main];
    containers.extend(output_uploader(ctx));
    containers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BuildContext {
        BuildContext {
            name: "job1".to_string(),
            command: "python train.py".to_string(),
            image: "trainer:latest".to_string(),
            service_account: "default".to_string(),
            env_vars: BTreeMap::from([
                ("ZZZ".to_string(), "last".to_string()),
                ("AAA".to_string(), "first".to_string()),
            ]),
            output_dir: None,
            enable_pre_provisioner: false,
        }
    }

    #[test]
    fn job_env_follows_builder_env_sorted_by_key() {
        let env = container_env(vec![env_var("NUM_TPU_SLICES", "2")], &ctx());
        let names: Vec<_> = env.iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["NUM_TPU_SLICES", "AAA", "ZZZ"]);
    }

    #[test]
    fn pre_provisioner_selector_only_when_enabled() {
        let base = BTreeMap::from([("a".to_string(), "b".to_string())]);
        assert_eq!(node_selector(&ctx(), base.clone()), base);

        let mut enabled = ctx();
        enabled.enable_pre_provisioner = true;
        let selector = node_selector(&enabled, base);
        assert_eq!(selector.get(PRE_PROVISIONER_LABEL).map(String::as_str), Some("job1"));
        assert_eq!(selector.get("a").map(String::as_str), Some("b"));
    }

    #[test]
    fn no_output_pieces_without_output_dir() {
        assert!(output_uploader(&ctx()).is_none());
        assert!(output_volume(&ctx()).is_none());
        assert!(output_mount(&ctx()).is_none());
        assert_eq!(containers(json!({"name": "main"}), &ctx()).len(), 1);
    }

    #[test]
    fn uploader_syncs_host_output_to_output_dir() {
        let mut with_output = ctx();
        with_output.output_dir = Some("gs://bucket/runs/job1/".to_string());

        let uploader = output_uploader(&with_output).unwrap();
        assert_eq!(uploader["name"], OUTPUT_UPLOADER_CONTAINER);
        let script = uploader["command"][2].as_str().unwrap();
        assert!(script.contains("gsutil -m rsync -r /output/$HOSTNAME/ gs://bucket/runs/job1/output/$HOSTNAME/"));
        assert_eq!(output_volume(&with_output).unwrap()["emptyDir"], json!({}));
        assert_eq!(containers(json!({"name": "main"}), &with_output).len(), 2);
    }

    #[test]
    fn completion_index_env_reads_annotation() {
        let env = completion_index_env("PROCESS_ID");
        assert_eq!(
            env["valueFrom"]["fieldRef"]["fieldPath"],
            "metadata.annotations['batch.kubernetes.io/job-completion-index']"
        );
    }
}
