//! Per-ingress configuration model and the shared global context.
//!
//! An [`Ingress`] is created empty for one resource, filled once by the parser
//! pass and read by the handler pass. Each optional field belongs to exactly one
//! parser; `None` means the feature was not requested and handlers no-op.

use super::accessor::{Annotations, CLUSTER_ID_KEY, RAW_CLUSTER_ID_KEY};
use super::{
    auth::AuthConfig, authz::AuthzConfig, canary::CanaryConfig, cors::CorsConfig,
    destination::DestinationConfig, downstream_tls::DownstreamTlsConfig,
    fallback::FallbackConfig, header_control::HeaderControlConfig, http2rpc::Http2RpcConfig,
    ignore_case::IgnoreCaseConfig, ip_access_control::IpAccessControlConfig,
    load_balance::LoadBalanceConfig, local_rate_limit::LocalRateLimitConfig,
    mcp_server::McpServer, mirror::MirrorConfig, redirect::RedirectConfig,
    retry::RetryConfig, rewrite::RewriteConfig, route_match::MatchConfig,
    timeout::TimeoutConfig, upstream_tls::UpstreamTlsConfig,
};
use crate::errors::AnnotationError;
use crate::kube::{SecretLister, ServiceLister};
use k8s_openapi::api::core::v1::{Secret, Service};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Identity of the ingress resource being processed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub namespace: String,
    pub name: String,
    pub raw_cluster_id: String,
    pub cluster_id: String,
}

impl Meta {
    /// Identity for `namespace/name`; cluster annotations override `default_cluster`
    pub fn from_annotations(
        namespace: impl Into<String>,
        name: impl Into<String>,
        annotations: &Annotations,
        default_cluster: &str,
    ) -> Self {
        let cluster_id = annotations
            .get(CLUSTER_ID_KEY)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default_cluster)
            .to_string();
        let raw_cluster_id = annotations
            .get(RAW_CLUSTER_ID_KEY)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| cluster_id.clone());

        Self { namespace: namespace.into(), name: name.into(), raw_cluster_id, cluster_id }
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub meta: Meta,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_tls: Option<UpstreamTlsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_tls: Option<DownstreamTlsConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_access_control: Option<IpAccessControlConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balance: Option<LoadBalanceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_rate_limit: Option<LocalRateLimitConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_case: Option<IgnoreCaseConfig>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub r#match: Option<MatchConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_control: Option<HeaderControlConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authz: Option<AuthzConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http2rpc: Option<Http2RpcConfig>,
}

impl Ingress {
    pub fn new(meta: Meta) -> Self {
        Self { meta, ..Default::default() }
    }
}

/// State shared across every ingress of one translation run.
///
/// Listers are read-only collaborators keyed by cluster id. `watched_secrets`
/// and `mcp_servers` are write-only side channels consumed by the surrounding
/// controller.
pub struct GlobalContext {
    pub watched_secrets: BTreeSet<String>,
    pub cluster_secret_lister: HashMap<String, SecretLister>,
    pub cluster_service_lister: HashMap<String, ServiceLister>,
    pub mcp_servers: Vec<McpServer>,
    pub domain_suffix: String,
}

impl Default for GlobalContext {
    fn default() -> Self {
        Self {
            watched_secrets: BTreeSet::new(),
            cluster_secret_lister: HashMap::new(),
            cluster_service_lister: HashMap::new(),
            mcp_servers: Vec::new(),
            domain_suffix: "cluster.local".to_string(),
        }
    }
}

impl fmt::Debug for GlobalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalContext")
            .field("watched_secrets", &self.watched_secrets)
            .field("secret_clusters", &self.cluster_secret_lister.keys().collect::<Vec<_>>())
            .field("service_clusters", &self.cluster_service_lister.keys().collect::<Vec<_>>())
            .field("mcp_servers", &self.mcp_servers)
            .field("domain_suffix", &self.domain_suffix)
            .finish()
    }
}

impl GlobalContext {
    pub fn with_service_lister(mut self, cluster: impl Into<String>, lister: ServiceLister) -> Self {
        self.cluster_service_lister.insert(cluster.into(), lister);
        self
    }

    pub fn with_secret_lister(mut self, cluster: impl Into<String>, lister: SecretLister) -> Self {
        self.cluster_secret_lister.insert(cluster.into(), lister);
        self
    }

    pub fn with_domain_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.domain_suffix = suffix.into();
        self
    }

    /// Record `namespace/name` so the controller re-processes on secret changes
    pub fn watch_secret(&mut self, namespace: &str, name: &str) {
        self.watched_secrets.insert(format!("{namespace}/{name}"));
    }

    /// Resolve a service; an unknown cluster is reported like a missing object
    pub fn service(&self, cluster: &str, namespace: &str, name: &str) -> Result<Service, AnnotationError> {
        self.cluster_service_lister
            .get(cluster)
            .and_then(|lister| lister.get(namespace, name))
            .ok_or_else(|| AnnotationError::missing_reference("service", namespace, name, cluster))
    }

    /// Resolve a secret; an unknown cluster is reported like a missing object
    pub fn secret(&self, cluster: &str, namespace: &str, name: &str) -> Result<Secret, AnnotationError> {
        self.cluster_secret_lister
            .get(cluster)
            .and_then(|lister| lister.get(namespace, name))
            .ok_or_else(|| AnnotationError::missing_reference("secret", namespace, name, cluster))
    }
}
