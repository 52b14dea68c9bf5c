//! External authorization service description.
//!
//! Only the `ext-authz` type exists. The parsed config is consumed by the
//! surrounding controller when it renders the ext_authz filter and its RBAC
//! policy, so there is no handler here.

use super::util::split_string_with_space_trim;
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser};
use crate::errors::AnnotationError;
use serde::Serialize;
use tracing::{error, warn};

const AUTHZ_TYPE: &str = "authz-type";
const PROTO: &str = "ext-authz-proto";
const SERVICE: &str = "ext-authz-service";
const SERVICE_PORT: &str = "ext-authz-service-port";
const SERVICE_PATH_PREFIX: &str = "ext-authz-http-service-path-prefix";
const SERVICE_TIMEOUT: &str = "ext-authz-timeout";
const REQ_ALLOWED_HEADERS: &str = "ext-authz-req-allowed-headers";
const UPSTREAM_ALLOWED_HEADERS: &str = "ext-authz-req-allowed-upstream-headers";
const CLIENT_ALLOWED_HEADERS: &str = "ext-authz-req-allowed-client-headers";
const RBAC_POLICY_ID: &str = "ext-authz-rbac-policy-id";
const REQ_MAX_BYTES: &str = "ext-authz-req-max-bytes";
const REQ_ALLOW_PARTIAL: &str = "ext-authz-req-allow-partial";
const PACK_AS_BYTES: &str = "ext-authz-pack-as-bytes";
const FAILURE_MODE_ALLOW: &str = "ext-authz-failure-mode-allow";

const EXT_AUTHZ: &str = "ext-authz";
const DEFAULT_SERVICE_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtAuthzProto {
    #[default]
    Grpc,
    Http,
}

/// Header names allowed through, grouped by match kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatchers {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exact: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prefix: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suffix: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<String>,
}

impl HeaderMatchers {
    /// Reads `{base}-exact`, `{base}-prefix`, `{base}-suffix` and `{base}-contains`
    fn from_annotations(annotations: &Annotations, base: &str) -> Self {
        let read = |kind: &str| {
            annotations
                .parse_string_native(&format!("{base}-{kind}"))
                .map(|v| split_string_with_space_trim(&v))
                .unwrap_or_default()
        };
        Self { exact: read("exact"), prefix: read("prefix"), suffix: read("suffix"), contains: read("contains") }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthzService {
    pub service_name: String,
    pub service_port: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub path_prefix: String,
    pub req_allowed_headers: HeaderMatchers,
    pub resp_allowed_upstream_headers: HeaderMatchers,
    pub resp_allowed_client_headers: HeaderMatchers,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuthzConfig {
    pub proto: ExtAuthzProto,
    pub service: AuthzService,
    pub rbac_policy_id: String,
    pub req_max_bytes: u32,
    pub req_allow_partial: bool,
    pub pack_as_bytes: bool,
    pub failure_mode_allow: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthzConfig {
    pub authz_type: String,
    pub ext_authz: ExtAuthzConfig,
}

pub struct Authz;

impl Parser for Authz {
    fn name(&self) -> &'static str {
        "authz"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !(annotations.has_native(AUTHZ_TYPE) && annotations.has_native(SERVICE)) {
            return Ok(Parsed::Absent);
        }

        let authz_type = annotations.parse_string_native(AUTHZ_TYPE)?;
        if authz_type != EXT_AUTHZ {
            return Err(AnnotationError::unsupported(AUTHZ_TYPE, authz_type));
        }
        let service_name = annotations.parse_string_native(SERVICE)?;

        let proto = match annotations.parse_string_native(PROTO).as_deref() {
            Ok("grpc") | Err(_) => ExtAuthzProto::Grpc,
            Ok("http") => ExtAuthzProto::Http,
            Ok(other) => {
                warn!(proto = other, "unknown ext-authz protocol, using grpc");
                ExtAuthzProto::Grpc
            }
        };

        let service_port = match annotations.parse_int_native(SERVICE_PORT) {
            Ok(port) => u16::try_from(port).ok().filter(|p| *p > 0).ok_or_else(|| {
                AnnotationError::invalid_value(SERVICE_PORT, port.to_string(), "port must be in 1..=65535")
            })?,
            Err(err) if err.is_missing() => DEFAULT_SERVICE_PORT,
            Err(err) => return Err(err),
        };

        let rbac_policy_id = annotations
            .parse_string_native(RBAC_POLICY_ID)
            .unwrap_or_else(|_| format!("{}-{}-ext-authz-policy", config.meta.namespace, config.meta.name));

        config.authz = Some(AuthzConfig {
            authz_type,
            ext_authz: ExtAuthzConfig {
                proto,
                service: AuthzService {
                    service_name,
                    service_port,
                    timeout: annotations.parse_string_native(SERVICE_TIMEOUT).unwrap_or_default(),
                    path_prefix: annotations.parse_string_native(SERVICE_PATH_PREFIX).unwrap_or_default(),
                    req_allowed_headers: HeaderMatchers::from_annotations(annotations, REQ_ALLOWED_HEADERS),
                    resp_allowed_upstream_headers: HeaderMatchers::from_annotations(
                        annotations,
                        UPSTREAM_ALLOWED_HEADERS,
                    ),
                    resp_allowed_client_headers: HeaderMatchers::from_annotations(annotations, CLIENT_ALLOWED_HEADERS),
                },
                rbac_policy_id,
                req_max_bytes: optional(annotations.parse_uint32_native(REQ_MAX_BYTES)),
                req_allow_partial: optional(annotations.parse_bool_native(REQ_ALLOW_PARTIAL)),
                pack_as_bytes: optional(annotations.parse_bool_native(PACK_AS_BYTES)),
                failure_mode_allow: optional(annotations.parse_bool_native(FAILURE_MODE_ALLOW)),
            },
        });
        Ok(Parsed::Applied)
    }
}

/// Value of an optional key; malformed values are logged and read as the default
fn optional<T: Default>(lookup: Result<T, AnnotationError>) -> T {
    match lookup {
        Ok(value) => value,
        Err(err) => {
            if !err.is_missing() {
                error!(error = %err, "ignoring ext-authz option");
            }
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;

    fn parse(pairs: &[(String, &str)]) -> (ParseResult, Option<AuthzConfig>) {
        let mut config = ingress("default", "web");
        let result = Authz.parse(&annotations(pairs), &mut config, &mut GlobalContext::default());
        (result, config.authz)
    }

    fn required() -> Vec<(String, &'static str)> {
        vec![(native(AUTHZ_TYPE), "ext-authz"), (native(SERVICE), "authz.default.svc.cluster.local")]
    }

    #[test]
    fn requires_type_and_service() {
        let (result, authz) = parse(&[(native(AUTHZ_TYPE), "ext-authz")]);
        assert_eq!(result.expect("parse"), Parsed::Absent);
        assert!(authz.is_none());

        let (result, _) = parse(&[(nginx(AUTHZ_TYPE), "ext-authz"), (nginx(SERVICE), "authz")]);
        assert_eq!(result.expect("parse"), Parsed::Absent);
    }

    #[test]
    fn defaults() {
        let (result, authz) = parse(&required());
        assert_eq!(result.expect("parse"), Parsed::Applied);
        let ext = authz.expect("authz").ext_authz;
        assert_eq!(ext.proto, ExtAuthzProto::Grpc);
        assert_eq!(ext.service.service_port, 80);
        assert_eq!(ext.rbac_policy_id, "default-web-ext-authz-policy");
        assert_eq!(ext.req_max_bytes, 0);
        assert!(!ext.failure_mode_allow);
    }

    #[test]
    fn header_families_and_options() {
        let mut pairs = required();
        pairs.extend([
            (native(PROTO), "http"),
            (native(SERVICE_PORT), "8090"),
            (native(SERVICE_PATH_PREFIX), "/auth"),
            (native(SERVICE_TIMEOUT), "500ms"),
            (native("ext-authz-req-allowed-headers-exact"), "x-user, x-token"),
            (native("ext-authz-req-allowed-upstream-headers-prefix"), "x-auth-"),
            (native("ext-authz-req-allowed-client-headers-contains"), "*"),
            (native(RBAC_POLICY_ID), "custom"),
            (native(REQ_MAX_BYTES), "4096"),
            (native(REQ_ALLOW_PARTIAL), "true"),
            (native(PACK_AS_BYTES), "yes"),
        ]);
        let (_, authz) = parse(&pairs);
        let ext = authz.expect("authz").ext_authz;
        assert_eq!(ext.proto, ExtAuthzProto::Http);
        assert_eq!(ext.service.service_port, 8090);
        assert_eq!(ext.service.path_prefix, "/auth");
        assert_eq!(ext.service.timeout, "500ms");
        assert_eq!(ext.service.req_allowed_headers.exact, vec!["x-user", "x-token"]);
        assert_eq!(ext.service.resp_allowed_upstream_headers.prefix, vec!["x-auth-"]);
        assert_eq!(ext.service.resp_allowed_client_headers.contains, vec!["*"]);
        assert_eq!(ext.rbac_policy_id, "custom");
        assert_eq!(ext.req_max_bytes, 4096);
        assert!(ext.req_allow_partial);
        // "yes" is not a boolean
        assert!(!ext.pack_as_bytes);
    }

    #[test]
    fn bad_type_or_port_skips_the_feature() {
        let (result, authz) = parse(&[(native(AUTHZ_TYPE), "opa"), (native(SERVICE), "authz")]);
        assert!(matches!(result, Err(AnnotationError::Unsupported { .. })));
        assert!(authz.is_none());

        let mut pairs = required();
        pairs.push((native(SERVICE_PORT), "70000"));
        let (result, authz) = parse(&pairs);
        assert!(matches!(result, Err(AnnotationError::InvalidValue { .. })));
        assert!(authz.is_none());
    }
}
