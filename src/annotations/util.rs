//! Shared helpers for annotation parsers.

use crate::errors::AnnotationError;
use std::fmt;

const CREDENTIAL_SCHEME: &str = "kubernetes-ingress://";

/// Comma separated list with whitespace trimmed; a `*` entry collapses the list to `["*"]`
pub fn split_string_with_space_trim(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    for item in input.split(',') {
        let item = item.trim();
        if item == "*" {
            return vec!["*".to_string()];
        }
        if !item.is_empty() {
            out.push(item.to_string());
        }
    }
    out
}

/// Comma separated list with whitespace trimmed and blanks dropped
pub fn split_by_comma(input: &str) -> Vec<String> {
    input.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// `namespace/name` reference to a Kubernetes object
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// Parse `name` or `namespace/name`; a bare name takes `default_namespace`
    pub fn parse(key: &str, value: &str, default_namespace: &str) -> Result<Self, AnnotationError> {
        let value = value.trim();
        let (namespace, name) = match value.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => (default_namespace, value),
        };
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(AnnotationError::invalid_value(key, value, "expected namespace/name"));
        }
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// In-mesh FQDN of a service
pub fn service_host(name: &str, namespace: &str, domain_suffix: &str) -> String {
    format!("{name}.{namespace}.svc.{domain_suffix}")
}

/// Credential name the gateway uses to fetch a Kubernetes secret
pub fn credential_name(cluster_id: &str, namespace: &str, name: &str) -> String {
    format!("{CREDENTIAL_SCHEME}{cluster_id}/{namespace}/{name}")
}

/// Inverse of [`credential_name`]: `(cluster, namespace, name)`
pub fn extract_credential(credential: &str) -> Option<(String, String, String)> {
    let rest = credential.strip_prefix(CREDENTIAL_SCHEME)?;
    let mut parts = rest.splitn(3, '/');
    let cluster = parts.next()?;
    let namespace = parts.next()?;
    let name = parts.next()?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((cluster.to_string(), namespace.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_collapses_list() {
        assert_eq!(split_string_with_space_trim("a.com, *, b.com"), vec!["*"]);
        assert_eq!(split_string_with_space_trim(" a , b ,, c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn namespaced_names_default_namespace() {
        let nn = NamespacedName::parse("k", "svc", "default").expect("bare name");
        assert_eq!(nn.to_string(), "default/svc");
        let nn = NamespacedName::parse("k", "other/svc", "default").expect("qualified");
        assert_eq!(nn, NamespacedName::new("other", "svc"));
        assert!(NamespacedName::parse("k", "a/b/c", "default").is_err());
        assert!(NamespacedName::parse("k", "/svc", "default").is_err());
    }

    #[test]
    fn credential_names_round_trip() {
        let credential = credential_name("c1", "default", "tls");
        assert_eq!(credential, "kubernetes-ingress://c1/default/tls");
        assert_eq!(
            extract_credential(&credential),
            Some(("c1".into(), "default".into(), "tls".into()))
        );
        assert_eq!(
            extract_credential("kubernetes-ingress:///default/tls"),
            Some(("".into(), "default".into(), "tls".into()))
        );
        assert!(extract_credential("file:///etc/certs").is_none());
    }

    #[test]
    fn service_hosts_use_suffix() {
        assert_eq!(service_host("web", "default", "cluster.local"), "web.default.svc.cluster.local");
    }
}
