//! Backend protocol and client-side TLS towards upstreams.

use super::util::{credential_name, NamespacedName};
use super::{
    Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, TrafficPolicyHandler,
};
use crate::mesh::{
    ClientTlsMode, ClientTlsSettings, ConnectionPoolSettings, H2UpgradePolicy, HttpPoolSettings,
    TrafficPolicy,
};
use serde::Serialize;
use tracing::warn;

const BACKEND_PROTOCOL: &str = "backend-protocol";
const PROXY_SSL_SECRET: &str = "proxy-ssl-secret";
const PROXY_SSL_VERIFY: &str = "proxy-ssl-verify";
const PROXY_SSL_NAME: &str = "proxy-ssl-name";
const PROXY_SSL_SERVER_NAME: &str = "proxy-ssl-server-name";

const DEFAULT_BACKEND_PROTOCOL: &str = "HTTP";
const VALID_PROTOCOLS: [&str; 5] = ["HTTP", "HTTP2", "HTTPS", "GRPC", "GRPCS"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTlsConfig {
    pub backend_protocol: String,
    pub ssl_verify: bool,
    pub sni: String,
    pub enable_sni: bool,
    /// `namespace/name` of the client certificate secret
    pub secret_name: String,
}

impl Default for UpstreamTlsConfig {
    fn default() -> Self {
        Self {
            backend_protocol: DEFAULT_BACKEND_PROTOCOL.to_string(),
            ssl_verify: false,
            sni: String::new(),
            enable_sni: false,
            secret_name: String::new(),
        }
    }
}

impl UpstreamTlsConfig {
    pub fn is_https(&self) -> bool {
        matches!(self.backend_protocol.as_str(), "HTTPS" | "GRPCS")
    }

    pub fn is_http2(&self) -> bool {
        matches!(self.backend_protocol.as_str(), "HTTP2" | "GRPC" | "GRPCS")
    }
}

pub struct UpstreamTls;

impl Parser for UpstreamTls {
    fn name(&self) -> &'static str {
        "upstream-tls"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, ctx: &mut GlobalContext) -> ParseResult {
        if !need_upstream_tls_config(annotations) {
            return Ok(Parsed::Absent);
        }

        let mut tls = UpstreamTlsConfig::default();

        if let Ok(protocol) = annotations.parse_string_asap(BACKEND_PROTOCOL) {
            let protocol = protocol.trim().to_ascii_uppercase();
            if VALID_PROTOCOLS.contains(&protocol.as_str()) {
                tls.backend_protocol = protocol;
            } else {
                warn!(protocol = %protocol, "unsupported backend protocol, using HTTP");
            }
        }

        if let Ok(secret) = annotations.parse_string_asap(PROXY_SSL_SECRET) {
            let secret = NamespacedName::parse(PROXY_SSL_SECRET, &secret, &config.meta.namespace)?;
            ctx.watch_secret(&secret.namespace, &secret.name);
            tls.secret_name = secret.to_string();
        }

        tls.ssl_verify = is_on(annotations, PROXY_SSL_VERIFY);
        tls.sni = annotations.parse_string_asap(PROXY_SSL_NAME).unwrap_or_default();
        tls.enable_sni = is_on(annotations, PROXY_SSL_SERVER_NAME);

        config.upstream_tls = Some(tls);
        Ok(Parsed::Applied)
    }
}

impl TrafficPolicyHandler for UpstreamTls {
    fn apply_traffic_policy(&self, policy: &mut TrafficPolicy, config: &Ingress) {
        let Some(upstream) = &config.upstream_tls else {
            return;
        };

        if upstream.is_http2() {
            policy.connection_pool = Some(ConnectionPoolSettings {
                http: Some(HttpPoolSettings { h2_upgrade_policy: H2UpgradePolicy::Upgrade }),
            });
        }

        let mut tls = if !upstream.secret_name.is_empty() {
            let Some((namespace, name)) = upstream.secret_name.split_once('/') else {
                return;
            };
            ClientTlsSettings {
                mode: ClientTlsMode::Mutual,
                credential_name: credential_name(&config.meta.raw_cluster_id, namespace, name),
                ..Default::default()
            }
        } else if upstream.is_https() {
            ClientTlsSettings { mode: ClientTlsMode::Simple, ..Default::default() }
        } else {
            return;
        };

        if upstream.enable_sni && !upstream.sni.is_empty() {
            tls.sni = upstream.sni.clone();
        }
        policy.tls = Some(tls);
    }
}

fn is_on(annotations: &Annotations, key: &str) -> bool {
    annotations
        .parse_string_asap(key)
        .map(|value| value.eq_ignore_ascii_case("on"))
        .unwrap_or(false)
}

fn need_upstream_tls_config(annotations: &Annotations) -> bool {
    annotations.has_asap(BACKEND_PROTOCOL) || annotations.has_asap(PROXY_SSL_SECRET)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;

    fn parse(pairs: &[(String, &str)]) -> (Option<UpstreamTlsConfig>, GlobalContext) {
        let mut config = ingress("default", "web");
        let mut ctx = GlobalContext::default();
        let _ = UpstreamTls.parse(&annotations(pairs), &mut config, &mut ctx);
        (config.upstream_tls, ctx)
    }

    #[test]
    fn protocol_is_normalised_and_validated() {
        let (tls, _) = parse(&[(nginx(BACKEND_PROTOCOL), "grpcs")]);
        assert_eq!(tls.expect("tls").backend_protocol, "GRPCS");
        let (tls, _) = parse(&[(nginx(BACKEND_PROTOCOL), "AJP")]);
        assert_eq!(tls.expect("tls").backend_protocol, "HTTP");
        let (tls, _) = parse(&[(nginx(PROXY_SSL_VERIFY), "on")]);
        assert!(tls.is_none());
    }

    #[test]
    fn secret_defaults_to_ingress_namespace_and_is_watched() {
        let (tls, ctx) = parse(&[
            (nginx(PROXY_SSL_SECRET), "client-cert"),
            (nginx(PROXY_SSL_VERIFY), "ON"),
            (nginx(PROXY_SSL_NAME), "backend.internal"),
            (nginx(PROXY_SSL_SERVER_NAME), "on"),
        ]);
        let tls = tls.expect("tls");
        assert_eq!(tls.secret_name, "default/client-cert");
        assert!(tls.ssl_verify && tls.enable_sni);
        assert!(ctx.watched_secrets.contains("default/client-cert"));
    }

    #[test]
    fn mutual_tls_uses_raw_cluster_credential() {
        let mut config = ingress("default", "web");
        config.meta.raw_cluster_id = "c1".into();
        config.upstream_tls = Some(UpstreamTlsConfig {
            secret_name: "certs/client".into(),
            sni: "backend.internal".into(),
            enable_sni: true,
            ..Default::default()
        });
        let mut policy = TrafficPolicy::default();
        UpstreamTls.apply_traffic_policy(&mut policy, &config);
        assert_eq!(
            policy.tls,
            Some(ClientTlsSettings {
                mode: ClientTlsMode::Mutual,
                credential_name: "kubernetes-ingress://c1/certs/client".into(),
                sni: "backend.internal".into(),
                ..Default::default()
            })
        );
    }

    #[test]
    fn https_backend_without_secret_is_simple_tls() {
        let mut config = ingress("default", "web");
        config.upstream_tls = Some(UpstreamTlsConfig {
            backend_protocol: "HTTPS".into(),
            sni: "ignored.when.disabled".into(),
            ..Default::default()
        });
        let mut policy = TrafficPolicy::default();
        UpstreamTls.apply_traffic_policy(&mut policy, &config);
        assert_eq!(policy.tls, Some(ClientTlsSettings { mode: ClientTlsMode::Simple, ..Default::default() }));
    }

    #[test]
    fn plain_http_backend_leaves_policy_untouched() {
        let mut config = ingress("default", "web");
        config.upstream_tls = Some(UpstreamTlsConfig::default());
        let mut policy = TrafficPolicy::default();
        UpstreamTls.apply_traffic_policy(&mut policy, &config);
        assert!(policy.tls.is_none());
        assert!(policy.connection_pool.is_none());
    }

    #[test]
    fn http2_protocols_upgrade_the_connection_pool() {
        for protocol in ["HTTP2", "GRPC", "GRPCS"] {
            let mut config = ingress("default", "web");
            config.upstream_tls = Some(UpstreamTlsConfig { backend_protocol: protocol.into(), ..Default::default() });
            let mut policy = TrafficPolicy::default();
            UpstreamTls.apply_traffic_policy(&mut policy, &config);
            let pool = policy.connection_pool.and_then(|pool| pool.http).expect("http pool settings");
            assert_eq!(pool.h2_upgrade_policy, H2UpgradePolicy::Upgrade, "{protocol}");
            assert_eq!(policy.tls.is_some(), protocol == "GRPCS", "{protocol}");
        }
    }
}
