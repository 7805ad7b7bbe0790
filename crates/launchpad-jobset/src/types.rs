//! JobSet serialization types
//!
//! Typed representation of the `jobset.x-k8s.io` JobSet body. The apiVersion
//! is not part of [`JobSetDocument`]; it is attached by the submitter once the
//! cluster's served version is known.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of the JobSet custom resource
pub const JOBSET_KIND: &str = "JobSet";

/// Replicated job produced by an accelerator builder.
///
/// Opaque to the compiler apart from its `name`, and merged verbatim into
/// `spec.replicatedJobs`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ReplicatedJobSpec(pub serde_json::Value);

impl ReplicatedJobSpec {
    /// Name of the replicated job, if the builder set one
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(|n| n.as_str())
    }
}

impl From<serde_json::Value> for ReplicatedJobSpec {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Inputs to the JobSet compiler taken from a job's configuration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobSetConfig {
    /// JobSet name
    pub name: String,
    /// Total attempts; the JobSet restarts at most `max_tries - 1` times
    pub max_tries: u32,
    /// Kueue queue to submit into
    pub queue: Option<String>,
    /// Accelerator-specific annotations added by the builder
    pub annotations: BTreeMap<String, String>,
}

/// JobSet body without apiVersion/kind
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSetDocument {
    pub metadata: JobSetMetadata,
    pub spec: JobSetSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSetMetadata {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSetSpec {
    pub failure_policy: FailurePolicy,
    pub replicated_jobs: Vec<ReplicatedJobSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailurePolicy {
    pub max_restarts: u32,
}

/// JobSet as submitted to the cluster
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJobSet {
    pub api_version: String,
    pub kind: String,
    #[serde(flatten)]
    pub document: JobSetDocument,
}

impl JobSetDocument {
    /// Attach the cluster-resolved apiVersion and the JobSet kind
    pub fn into_resource(self, api_version: impl Into<String>) -> SubmittedJobSet {
        SubmittedJobSet {
            api_version: api_version.into(),
            kind: JOBSET_KIND.to_string(),
            document: self,
        }
    }

    /// Annotation value, if present
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> JobSetDocument {
        JobSetDocument {
            metadata: JobSetMetadata {
                name: "job1".to_string(),
                annotations: BTreeMap::new(),
            },
            spec: JobSetSpec {
                failure_policy: FailurePolicy { max_restarts: 2 },
                replicated_jobs: vec![ReplicatedJobSpec(json!({"name": "job", "replicas": 1}))],
            },
        }
    }

    #[test]
    fn document_matches_jobset_wire_schema() {
        let value = serde_json::to_value(document().into_resource("jobset.x-k8s.io/v1alpha2"))
            .unwrap();
        assert_eq!(
            value,
            json!({
                "apiVersion": "jobset.x-k8s.io/v1alpha2",
                "kind": "JobSet",
                "metadata": {"name": "job1", "annotations": {}},
                "spec": {
                    "failurePolicy": {"maxRestarts": 2},
                    "replicatedJobs": [{"name": "job", "replicas": 1}]
                }
            })
        );
    }

    #[test]
    fn replicated_job_name_is_read_from_the_body() {
        assert_eq!(ReplicatedJobSpec(json!({"name": "workers"})).name(), Some("workers"));
        assert_eq!(ReplicatedJobSpec(json!({"replicas": 2})).name(), None);
        assert_eq!(ReplicatedJobSpec(json!({"name": 7})).name(), None);
    }
}
