//! JobSet compilation from job configuration and builder output

use std::collections::{BTreeMap, BTreeSet};

use crate::error::CompileError;
use crate::types::{
    FailurePolicy, JobSetConfig, JobSetDocument, JobSetMetadata, JobSetSpec, ReplicatedJobSpec,
};

/// Annotation Kueue reads to admit a workload into a queue
pub const QUEUE_NAME_ANNOTATION: &str = "kueue.x-k8s.io/queue-name";

/// Annotation forcing every replicated job onto one topology domain
pub const EXCLUSIVE_TOPOLOGY_ANNOTATION: &str = "alpha.jobset.sigs.k8s.io/exclusive-topology";

/// Topology key for GKE node pools
pub const GKE_NODEPOOL_TOPOLOGY: &str = "cloud.google.com/gke-nodepool";

/// Compile a JobSet document.
///
/// `maxRestarts` is `max_tries - 1`. The queue annotation is only present
/// when a queue is configured. Builder annotations extend the base set; they
/// never replace a key the compiler already set.
pub fn build_jobset(
    config: &JobSetConfig,
    replicated_jobs: Vec<ReplicatedJobSpec>,
) -> Result<JobSetDocument, CompileError> {
    if config.max_tries == 0 {
        return Err(CompileError::InvalidMaxTries {
            job: config.name.clone(),
        });
    }
    check_replicated_job_names(&config.name, &replicated_jobs)?;

    Ok(JobSetDocument {
        metadata: JobSetMetadata {
            name: config.name.clone(),
            annotations: compile_annotations(config),
        },
        spec: JobSetSpec {
            failure_policy: FailurePolicy {
                max_restarts: config.max_tries - 1,
            },
            replicated_jobs,
        },
    })
}

fn compile_annotations(config: &JobSetConfig) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    if let Some(queue) = &config.queue {
        annotations.insert(QUEUE_NAME_ANNOTATION.to_string(), queue.clone());
    }
    for (key, value) in &config.annotations {
        annotations
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    annotations
}

fn check_replicated_job_names(
    job: &str,
    replicated_jobs: &[ReplicatedJobSpec],
) -> Result<(), CompileError> {
    let mut seen = BTreeSet::new();
    for (index, rjob) in replicated_jobs.iter().enumerate() {
        let name = rjob.name().ok_or_else(|| CompileError::UnnamedReplicatedJob {
            job: job.to_string(),
            index,
        })?;
        if !seen.insert(name) {
            return Err(CompileError::DuplicateReplicatedJob {
                job: job.to_string(),
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn config(name: &str, max_tries: u32, queue: Option<&str>) -> JobSetConfig {
        JobSetConfig {
            name: name.to_string(),
            max_tries,
            queue: queue.map(str::to_string),
            annotations: BTreeMap::new(),
        }
    }

    fn replicated_job(name: &str) -> ReplicatedJobSpec {
        ReplicatedJobSpec(json!({
            "name": name,
            "replicas": 1,
            "template": {"spec": {"template": {"spec": {"containers": []}}}}
        }))
    }

    #[rstest]
    #[case(1, 0)]
    #[case(2, 1)]
    #[case(3, 2)]
    #[case(10, 9)]
    fn max_restarts_is_one_less_than_max_tries(#[case] max_tries: u32, #[case] expected: u32) {
        let doc = build_jobset(&config("job", max_tries, None), vec![replicated_job("job")])
            .unwrap();
        assert_eq!(doc.spec.failure_policy.max_restarts, expected);
    }

    #[test]
    fn zero_max_tries_is_rejected() {
        let err = build_jobset(&config("job", 0, None), vec![replicated_job("job")]).unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidMaxTries {
                job: "job".to_string()
            }
        );
    }

    #[test]
    fn queue_annotation_absent_without_queue() {
        let doc = build_jobset(&config("job", 1, None), vec![replicated_job("job")]).unwrap();
        assert!(doc.annotation(QUEUE_NAME_ANNOTATION).is_none());
        assert!(doc.metadata.annotations.is_empty());
    }

    #[test]
    fn queue_annotation_matches_configured_queue() {
        let doc = build_jobset(&config("job", 1, Some("team-a")), vec![replicated_job("job")])
            .unwrap();
        assert_eq!(doc.annotation(QUEUE_NAME_ANNOTATION), Some("team-a"));
    }

    #[test]
    fn builder_annotations_extend_base_annotations() {
        let mut cfg = config("job", 1, Some("q1"));
        cfg.annotations = BTreeMap::from([
            (
                EXCLUSIVE_TOPOLOGY_ANNOTATION.to_string(),
                GKE_NODEPOOL_TOPOLOGY.to_string(),
            ),
            (QUEUE_NAME_ANNOTATION.to_string(), "other".to_string()),
        ]);

        let doc = build_jobset(&cfg, vec![replicated_job("job")]).unwrap();
        assert_eq!(doc.annotation(QUEUE_NAME_ANNOTATION), Some("q1"));
        assert_eq!(
            doc.annotation(EXCLUSIVE_TOPOLOGY_ANNOTATION),
            Some(GKE_NODEPOOL_TOPOLOGY)
        );
    }

    #[test]
    fn replicated_jobs_are_merged_verbatim_in_order() {
        let jobs = vec![replicated_job("coordinator"), replicated_job("workers")];
        let doc = build_jobset(&config("job", 2, None), jobs.clone()).unwrap();
        assert_eq!(doc.spec.replicated_jobs, jobs);
    }

    #[test]
    fn duplicate_replicated_job_names_are_rejected() {
        let err = build_jobset(
            &config("job", 1, None),
            vec![replicated_job("job"), replicated_job("job")],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::DuplicateReplicatedJob { ref name, .. } if name == "job"));
    }

    #[test]
    fn unnamed_replicated_job_is_rejected() {
        let err = build_jobset(
            &config("job", 1, None),
            vec![ReplicatedJobSpec(json!({"replicas": 1}))],
        )
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::UnnamedReplicatedJob {
                job: "job".to_string(),
                index: 0
            }
        );
    }

    #[test]
    fn tpu_style_job_compiles_with_topology_and_no_queue() {
        let mut cfg = config("job1", 3, None);
        cfg.annotations.insert(
            EXCLUSIVE_TOPOLOGY_ANNOTATION.to_string(),
            GKE_NODEPOOL_TOPOLOGY.to_string(),
        );

        let doc = build_jobset(&cfg, vec![replicated_job("job")]).unwrap();
        assert_eq!(doc.metadata.name, "job1");
        assert_eq!(doc.spec.failure_policy.max_restarts, 2);
        assert!(doc.annotation(QUEUE_NAME_ANNOTATION).is_none());
        assert!(doc.annotation(EXCLUSIVE_TOPOLOGY_ANNOTATION).is_some());
        assert_eq!(doc.spec.replicated_jobs.len(), 1);
    }

    #[test]
    fn queued_job_without_builder_annotations() {
        let doc = build_jobset(&config("job2", 1, Some("q1")), vec![replicated_job("job")])
            .unwrap();
        assert_eq!(doc.spec.failure_policy.max_restarts, 0);
        assert_eq!(doc.annotation(QUEUE_NAME_ANNOTATION), Some("q1"));
        assert!(doc.annotation(EXCLUSIVE_TOPOLOGY_ANNOTATION).is_none());
    }
}
