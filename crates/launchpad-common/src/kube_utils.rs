//! Shared Kubernetes utilities using kube-rs
//!
//! The JobSet custom resource is not compiled into `k8s-openapi`, so its
//! group/version is resolved at runtime from the cluster's API discovery and
//! addressed through `DynamicObject` APIs.

use kube::discovery::{ApiResource, Discovery};
use kube::Client;
use tracing::{info, warn};

/// API group registered by the JobSet controller
pub const JOBSET_GROUP: &str = "jobset.x-k8s.io";

/// Kind served by the JobSet controller
pub const JOBSET_KIND: &str = "JobSet";

/// API version used when discovery fails entirely
pub const JOBSET_FALLBACK_API_VERSION: &str = "jobset.x-k8s.io/v1alpha2";

/// Maximum length of a DNS-1123 label
pub const MAX_DNS_LABEL_LEN: usize = 63;

/// Parse an apiVersion string into (group, version)
///
/// ```
/// use launchpad_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("jobset.x-k8s.io/v1alpha2");
/// assert_eq!(group, "jobset.x-k8s.io");
/// assert_eq!(version, "v1alpha2");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind using the API server's simple rules
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version you provide is used exactly. Use [`discover_jobset`] when the
/// cluster's served version matters.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Look up a resource in pre-computed API discovery results.
///
/// Returns `None` if the CRD is not installed (not an error). Picks the
/// highest stability version the group serves for the kind.
pub fn find_discovered_resource(
    discovery: &Discovery,
    group: &str,
    kind: &str,
) -> Option<ApiResource> {
    for api_group in discovery.groups() {
        if api_group.name() != group {
            continue;
        }
        for (ar, _caps) in api_group.resources_by_stability() {
            if ar.kind == kind {
                info!(
                    group = %group,
                    kind = %kind,
                    api_version = %ar.api_version,
                    "discovered CRD version"
                );
                return Some(ar);
            }
        }
    }
    warn!(group = %group, kind = %kind, "CRD not found in API discovery");
    None
}

/// Resolve the JobSet resource from the cluster's registered API groups.
///
/// Runs discovery filtered to the JobSet group on every call, so the served
/// version always reflects the live cluster. See [`resolve_jobset`] for how
/// the discovery result is interpreted.
pub async fn discover_jobset(client: &Client) -> Option<ApiResource> {
    let discovered = Discovery::new(client.clone())
        .filter(&[JOBSET_GROUP])
        .run()
        .await
        .map(|discovery| find_discovered_resource(&discovery, JOBSET_GROUP, JOBSET_KIND));
    resolve_jobset(discovered)
}

/// Decide the JobSet resource from the outcome of API discovery.
///
/// A failed discovery falls back to [`JOBSET_FALLBACK_API_VERSION`]. A
/// successful discovery that did not find the CRD yields `None`.
pub fn resolve_jobset<E: std::fmt::Display>(
    discovered: Result<Option<ApiResource>, E>,
) -> Option<ApiResource> {
    match discovered {
        Ok(resource) => resource,
        Err(e) => {
            warn!(
                error = %e,
                fallback = JOBSET_FALLBACK_API_VERSION,
                "API discovery failed, falling back to hardcoded JobSet version"
            );
            Some(build_api_resource(JOBSET_FALLBACK_API_VERSION, JOBSET_KIND))
        }
    }
}

/// Validate a DNS-1123 label (lowercase alphanumeric with hyphens).
///
/// Rules:
/// - Must not be empty or longer than 63 characters
/// - Must start with a lowercase letter or digit
/// - May contain lowercase letters, digits, and hyphens
/// - Must not end with a hyphen
pub fn validate_dns_label(s: &str, what: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err(format!("{} cannot be empty", what));
    }
    if s.len() > MAX_DNS_LABEL_LEN {
        return Err(format!(
            "{} must be at most {} characters: {}",
            what, MAX_DNS_LABEL_LEN, s
        ));
    }

    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => {
            return Err(format!(
                "{} must start with a lowercase letter or digit: {}",
                what, s
            ))
        }
    }

    if chars.any(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-') {
        return Err(format!(
            "{} must be lowercase alphanumeric with hyphens: {}",
            what, s
        ));
    }

    if s.ends_with('-') {
        return Err(format!("{} cannot end with hyphen: {}", what, s));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_pluralize_kind() {
        assert_eq!(pluralize_kind("JobSet"), "jobsets");
        assert_eq!(pluralize_kind("LocalQueue"), "localqueues");
        assert_eq!(pluralize_kind("Policy"), "policies");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
    }

    #[test]
    fn test_build_api_resource_for_jobset() {
        let ar = build_api_resource(JOBSET_FALLBACK_API_VERSION, JOBSET_KIND);
        assert_eq!(ar.group, JOBSET_GROUP);
        assert_eq!(ar.version, "v1alpha2");
        assert_eq!(ar.kind, "JobSet");
        assert_eq!(ar.plural, "jobsets");
        assert_eq!(ar.api_version, "jobset.x-k8s.io/v1alpha2");
    }

    #[test]
    fn test_parse_api_version_core() {
        let (group, version) = parse_api_version("v1");
        assert_eq!(group, "");
        assert_eq!(version, "v1");
    }

    #[test]
    fn fallback_version_belongs_to_jobset_group() {
        assert!(JOBSET_FALLBACK_API_VERSION.starts_with(JOBSET_GROUP));
    }

    // ==========================================================================
    // DNS labels
    // ==========================================================================

    #[rstest]
    #[case("job1")]
    #[case("llm-pretrain-v5p-256")]
    #[case("1job")]
    #[case("0")]
    #[case("a")]
    fn dns_label_accepts_valid_names(#[case] name: &str) {
        assert!(validate_dns_label(name, "job name").is_ok());
    }

    #[rstest]
    #[case("")]
    #[case("Job1")]
    #[case("job_1")]
    #[case("job-")]
    #[case("-job")]
    #[case("job.1")]
    fn dns_label_rejects_invalid_names(#[case] name: &str) {
        assert!(validate_dns_label(name, "job name").is_err());
    }

    #[test]
    fn dns_label_rejects_overlong_names() {
        assert!(validate_dns_label(&"a".repeat(MAX_DNS_LABEL_LEN), "job name").is_ok());
        assert!(validate_dns_label(&"a".repeat(MAX_DNS_LABEL_LEN + 1), "job name").is_err());
    }

    // ==========================================================================
    // JobSet resolution
    // ==========================================================================

    #[test]
    fn failed_discovery_falls_back_to_known_version() {
        let resolved = resolve_jobset::<&str>(Err("connection refused")).unwrap();
        assert_eq!(resolved.api_version, JOBSET_FALLBACK_API_VERSION);
        assert_eq!(resolved.plural, "jobsets");
    }

    #[test]
    fn missing_crd_resolves_to_none() {
        assert!(resolve_jobset::<&str>(Ok(None)).is_none());
    }

    #[test]
    fn discovered_version_wins_over_fallback() {
        let served = build_api_resource("jobset.x-k8s.io/v1", JOBSET_KIND);
        let resolved = resolve_jobset::<&str>(Ok(Some(served))).unwrap();
        assert_eq!(resolved.version, "v1");
    }
}
