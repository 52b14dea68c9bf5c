//! Server-side TLS of gateway listeners: cipher suites, protocol bounds and
//! client certificate verification.
//!
//! Protocol bounds can be scoped to one server with a `.<server-name>` suffix
//! on the key (`tls-min-protocol-version.rule1`); a scoped bound beats the
//! global one for that server.

use super::util::{extract_credential, NamespacedName};
use super::{Annotations, GatewayHandler, GlobalContext, Ingress, ParseResult, Parsed, Parser};
use crate::mesh::{Gateway, ServerTlsMode, TlsProtocol};
use serde::Serialize;
use std::collections::BTreeMap;

const SSL_CIPHER: &str = "ssl-cipher";
const AUTH_TLS_SECRET: &str = "auth-tls-secret";
const TLS_MIN_VERSION: &str = "tls-min-protocol-version";
const TLS_MAX_VERSION: &str = "tls-max-protocol-version";

const CA_CERT_SUFFIX: &str = "-cacert";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamTlsConfig {
    pub mode: ServerTlsMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_secret_name: Option<NamespacedName>,
    pub cipher_suites: Vec<String>,
    pub min_version: String,
    pub max_version: String,
    /// Server name to version, overriding `min_version` for that server
    pub rule_min_version: BTreeMap<String, String>,
    pub rule_max_version: BTreeMap<String, String>,
}

pub struct DownstreamTls;

impl Parser for DownstreamTls {
    fn name(&self) -> &'static str {
        "downstream-tls"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, ctx: &mut GlobalContext) -> ParseResult {
        let rule_min_version = annotations.suffixed_entries(&format!("{TLS_MIN_VERSION}."));
        let rule_max_version = annotations.suffixed_entries(&format!("{TLS_MAX_VERSION}."));
        let requested = [SSL_CIPHER, AUTH_TLS_SECRET, TLS_MIN_VERSION, TLS_MAX_VERSION]
            .iter()
            .any(|key| annotations.has_asap(key));
        if !requested && rule_min_version.is_empty() && rule_max_version.is_empty() {
            return Ok(Parsed::Absent);
        }

        let mut tls = DownstreamTlsConfig {
            mode: ServerTlsMode::Simple,
            min_version: annotations.parse_string_asap(TLS_MIN_VERSION).unwrap_or_default(),
            max_version: annotations.parse_string_asap(TLS_MAX_VERSION).unwrap_or_default(),
            rule_min_version,
            rule_max_version,
            ..Default::default()
        };

        if let Ok(ciphers) = annotations.parse_string_asap(SSL_CIPHER) {
            tls.cipher_suites = ciphers
                .split(':')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(secret) = annotations.parse_string_asap(AUTH_TLS_SECRET) {
            let secret = NamespacedName::parse(AUTH_TLS_SECRET, &secret, &config.meta.namespace)?;
            ctx.watch_secret(&secret.namespace, &secret.name);
            tls.mode = ServerTlsMode::Mutual;
            tls.ca_secret_name = Some(secret);
        }

        config.downstream_tls = Some(tls);
        Ok(Parsed::Applied)
    }
}

impl GatewayHandler for DownstreamTls {
    fn apply_gateway(&self, gateway: &mut Gateway, config: &Ingress) {
        let Some(downstream) = &config.downstream_tls else {
            return;
        };

        for server in gateway.servers.iter_mut().filter(|s| s.is_https()) {
            let name = server.name.clone();
            let Some(tls) = server.tls.as_mut() else {
                continue;
            };

            if let Some(version) = pick_version(&downstream.rule_min_version, &name, &downstream.min_version) {
                tls.min_protocol_version = TlsProtocol::from_annotation(version);
            }
            if let Some(version) = pick_version(&downstream.rule_max_version, &name, &downstream.max_version) {
                tls.max_protocol_version = TlsProtocol::from_annotation(version);
            }
            if !downstream.cipher_suites.is_empty() {
                tls.cipher_suites = downstream.cipher_suites.clone();
            }

            if downstream.mode == ServerTlsMode::Mutual
                && ca_matches_server_cert(downstream.ca_secret_name.as_ref(), &tls.credential_name)
            {
                tls.mode = ServerTlsMode::Mutual;
            }
        }
    }
}

fn pick_version<'a>(rules: &'a BTreeMap<String, String>, server: &str, global: &'a str) -> Option<&'a str> {
    rules
        .get(server)
        .map(String::as_str)
        .or_else(|| (!global.is_empty()).then_some(global))
}

/// The CA must live next to the server certificate, either in the same
/// secret or in `<name>-cacert`
fn ca_matches_server_cert(ca: Option<&NamespacedName>, credential: &str) -> bool {
    let (Some(ca), Some((_, namespace, name))) = (ca, extract_credential(credential)) else {
        return false;
    };
    ca.namespace == namespace && (ca.name == name || ca.name == format!("{name}{CA_CERT_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;
    use crate::mesh::{Port, Server, ServerTlsSettings};

    fn parse(pairs: &[(String, &str)]) -> Option<DownstreamTlsConfig> {
        let mut config = ingress("foo", "web");
        let _ = DownstreamTls.parse(&annotations(pairs), &mut config, &mut GlobalContext::default());
        config.downstream_tls
    }

    fn https_gateway(name: &str, credential: &str) -> Gateway {
        Gateway {
            servers: vec![Server {
                name: name.into(),
                port: Port { number: 443, protocol: "HTTPS".into(), name: "https".into() },
                hosts: vec!["example.com".into()],
                tls: Some(ServerTlsSettings { credential_name: credential.into(), ..Default::default() }),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn cipher_suite_only() {
        assert!(parse(&[]).is_none());
        assert_eq!(
            parse(&[(nginx(SSL_CIPHER), "ECDHE-RSA-AES256-GCM-SHA384:AES128-SHA")]),
            Some(DownstreamTlsConfig {
                cipher_suites: vec!["ECDHE-RSA-AES256-GCM-SHA384".into(), "AES128-SHA".into()],
                ..Default::default()
            })
        );
    }

    #[test]
    fn rule_scoped_versions_alone_request_the_feature() {
        let tls = parse(&[
            (nginx("tls-min-protocol-version.rule1"), "TLSv1_1"),
            (nginx("tls-max-protocol-version.rule1"), "TLSv1_2"),
            (nginx("tls-min-protocol-version.rule2"), "TLSv1_2"),
        ])
        .expect("tls");
        assert!(tls.min_version.is_empty());
        assert_eq!(tls.rule_min_version.len(), 2);
        assert_eq!(tls.rule_max_version["rule1"], "TLSv1_2");
    }

    #[test]
    fn complete_native_configuration() {
        let mut config = ingress("foo", "web");
        let mut ctx = GlobalContext::default();
        let a = annotations(&[
            (native(AUTH_TLS_SECRET), "test/foo"),
            (native(TLS_MIN_VERSION), "TLSv1_2"),
            (native(TLS_MAX_VERSION), "TLSv1_3"),
            (native("tls-min-protocol-version.rule1"), "TLSv1_1"),
            (nginx(SSL_CIPHER), "ECDHE-RSA-AES256-GCM-SHA384"),
        ]);
        DownstreamTls.parse(&a, &mut config, &mut ctx).expect("parse");

        let tls = config.downstream_tls.expect("tls");
        assert_eq!(tls.mode, ServerTlsMode::Mutual);
        assert_eq!(tls.ca_secret_name, Some(NamespacedName::new("test", "foo")));
        assert_eq!((tls.min_version.as_str(), tls.max_version.as_str()), ("TLSv1_2", "TLSv1_3"));
        assert!(ctx.watched_secrets.contains("test/foo"));
    }

    #[test]
    fn rule_versions_override_global_on_matching_server() {
        let mut config = ingress("foo", "web");
        config.downstream_tls = Some(DownstreamTlsConfig {
            min_version: "TLSv1_2".into(),
            max_version: "TLSv1_3".into(),
            rule_min_version: [("rule1".to_string(), "TLSv1_1".to_string())].into(),
            ..Default::default()
        });
        let mut gateway = https_gateway("rule1", "");
        DownstreamTls.apply_gateway(&mut gateway, &config);
        let tls = gateway.servers[0].tls.as_ref().expect("tls");
        assert_eq!(tls.min_protocol_version, TlsProtocol::TlsV1_1);
        assert_eq!(tls.max_protocol_version, TlsProtocol::TlsV1_3);
        assert_eq!(tls.mode, ServerTlsMode::Simple);
    }

    #[test]
    fn mutual_only_when_ca_sits_next_to_server_cert() {
        let mut config = ingress("foo", "web");
        let mutual = |ca: NamespacedName| DownstreamTlsConfig {
            mode: ServerTlsMode::Mutual,
            ca_secret_name: Some(ca),
            cipher_suites: vec!["ECDHE-RSA-AES256-GCM-SHA384".into()],
            ..Default::default()
        };

        config.downstream_tls = Some(mutual(NamespacedName::new("foo", "bar")));
        let mut gateway = https_gateway("rule1", "kubernetes-ingress://cluster/foo/bar");
        DownstreamTls.apply_gateway(&mut gateway, &config);
        let tls = gateway.servers[0].tls.as_ref().expect("tls");
        assert_eq!(tls.mode, ServerTlsMode::Mutual);
        assert_eq!(tls.cipher_suites, vec!["ECDHE-RSA-AES256-GCM-SHA384"]);

        config.downstream_tls = Some(mutual(NamespacedName::new("foo", "bar-cacert")));
        let mut gateway = https_gateway("rule1", "kubernetes-ingress://cluster/foo/bar");
        DownstreamTls.apply_gateway(&mut gateway, &config);
        assert_eq!(gateway.servers[0].tls.as_ref().map(|t| t.mode), Some(ServerTlsMode::Mutual));

        config.downstream_tls = Some(mutual(NamespacedName::new("other", "bar")));
        let mut gateway = https_gateway("rule1", "kubernetes-ingress://cluster/foo/bar");
        DownstreamTls.apply_gateway(&mut gateway, &config);
        assert_eq!(gateway.servers[0].tls.as_ref().map(|t| t.mode), Some(ServerTlsMode::Simple));
    }

    #[test]
    fn plain_http_servers_are_skipped() {
        let mut config = ingress("foo", "web");
        config.downstream_tls = Some(DownstreamTlsConfig { min_version: "TLSv1_2".into(), ..Default::default() });
        let mut gateway = https_gateway("rule1", "");
        gateway.servers[0].port.protocol = "HTTP".into();
        DownstreamTls.apply_gateway(&mut gateway, &config);
        assert_eq!(
            gateway.servers[0].tls.as_ref().map(|t| t.min_protocol_version),
            Some(TlsProtocol::TlsAuto)
        );
    }
}
