//! Credential resolution for cluster access
//!
//! Credentials are resolved fresh for every cluster operation; nothing here
//! caches a client or a token. When an impersonation target is requested the
//! ambient identity must be allowed to impersonate it, which is checked with a
//! `SelfSubjectAccessReview` before any credential is handed out.

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::api::PostParams;
use kube::{Api, Client, Config};
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::{Error, DEFAULT_NAMESPACE};

/// Prefix of Kubernetes service account usernames
pub const SERVICE_ACCOUNT_USER_PREFIX: &str = "system:serviceaccount:";

/// Resolved credentials for one cluster operation
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Client configuration carrying the ambient or impersonated identity
    pub config: Config,
    /// Impersonated username, `None` for the ambient identity
    pub identity: Option<String>,
    /// Groups requested alongside the impersonated identity
    pub scopes: Vec<String>,
}

impl Credentials {
    /// Build a client from these credentials
    pub fn client(&self) -> Result<Client, kube::Error> {
        Client::try_from(self.config.clone())
    }
}

/// Source of credentials for cluster operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve credentials, optionally impersonating `impersonate_account`
    /// with the given scopes.
    ///
    /// Fails with [`Error::Auth`] when no ambient identity is available or the
    /// ambient identity may not impersonate the requested account.
    async fn get_credentials(
        &self,
        impersonate_account: Option<String>,
        impersonate_scopes: Vec<String>,
    ) -> Result<Credentials, Error>;
}

/// Service account reference parsed from an impersonation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountRef {
    /// Namespace of the service account
    pub namespace: String,
    /// Name of the service account
    pub name: String,
}

impl ServiceAccountRef {
    /// Parse `name`, `namespace:name`, or `system:serviceaccount:namespace:name`
    pub fn parse(account: &str) -> Result<Self, Error> {
        let trimmed = account
            .strip_prefix(SERVICE_ACCOUNT_USER_PREFIX)
            .unwrap_or(account);
        let (namespace, name) = match trimmed.split_once(':') {
            Some((ns, name)) => (ns, name),
            None => (DEFAULT_NAMESPACE, trimmed),
        };
        if namespace.is_empty() || name.is_empty() || name.contains(':') {
            return Err(Error::auth(
                Some(account),
                "expected <name>, <namespace>:<name> or system:serviceaccount:<namespace>:<name>",
            ));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Kubernetes username for this service account
    pub fn username(&self) -> String {
        format!(
            "{}{}:{}",
            SERVICE_ACCOUNT_USER_PREFIX, self.namespace, self.name
        )
    }
}

/// Apply an impersonation target to a client configuration
pub fn impersonate(mut config: Config, username: &str, scopes: &[String]) -> Config {
    config.auth_info.impersonate = Some(username.to_string());
    config.auth_info.impersonate_groups = if scopes.is_empty() {
        None
    } else {
        Some(scopes.to_vec())
    };
    config
}

/// Credential provider backed by the ambient kubeconfig or in-cluster config
#[derive(Debug, Clone, Default)]
pub struct KubeCredentialProvider;

impl KubeCredentialProvider {
    /// Create a provider
    pub fn new() -> Self {
        Self
    }

    async fn check_can_impersonate(
        &self,
        config: &Config,
        account: &str,
        sa: &ServiceAccountRef,
    ) -> Result<(), Error> {
        let client = Client::try_from(config.clone())
            .map_err(|e| Error::auth(Some(account), format!("failed to build client: {}", e)))?;
        let reviews: Api<SelfSubjectAccessReview> = Api::all(client);
        let review = SelfSubjectAccessReview {
            metadata: Default::default(),
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    verb: Some("impersonate".to_string()),
                    resource: Some("serviceaccounts".to_string()),
                    namespace: Some(sa.namespace.clone()),
                    name: Some(sa.name.clone()),
                    ..Default::default()
                }),
                non_resource_attributes: None,
            },
            status: None,
        };

        let result = reviews
            .create(&PostParams::default(), &review)
            .await
            .map_err(|e| Error::auth(Some(account), format!("access review failed: {}", e)))?;

        let status = result
            .status
            .ok_or_else(|| Error::auth(Some(account), "access review response missing status"))?;

        if !status.allowed {
            let reason = status
                .reason
                .unwrap_or_else(|| "no reason given".to_string());
            return Err(Error::auth(
                Some(account),
                format!("not permitted to impersonate: {}", reason),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for KubeCredentialProvider {
    async fn get_credentials(
        &self,
        impersonate_account: Option<String>,
        impersonate_scopes: Vec<String>,
    ) -> Result<Credentials, Error> {
        let config = Config::infer().await.map_err(|e| {
            Error::auth(
                impersonate_account.as_deref(),
                format!("no ambient credentials: {}", e),
            )
        })?;

        let Some(account) = impersonate_account else {
            debug!(cluster_url = %config.cluster_url, "using ambient credentials");
            return Ok(Credentials {
                config,
                identity: None,
                scopes: Vec::new(),
            });
        };

        let sa = ServiceAccountRef::parse(&account)?;
        self.check_can_impersonate(&config, &account, &sa).await?;

        let username = sa.username();
        info!(identity = %username, scopes = ?impersonate_scopes, "impersonating service account");
        Ok(Credentials {
            config: impersonate(config, &username, &impersonate_scopes),
            identity: Some(username),
            scopes: impersonate_scopes,
        })
    }
}
