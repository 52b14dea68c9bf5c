//! # Mesh Configuration Objects
//!
//! Target shapes the annotation handlers mutate. They follow the Istio
//! networking API (camelCase JSON, optional blocks omitted when unset) with the
//! Higress extensions used by ingress annotations: fallback clusters, internal
//! active redirects and HTTP filter attachments.

pub mod gateway;
pub mod traffic_policy;
pub mod virtual_service;

pub use gateway::{Gateway, Port, Server, ServerTlsMode, ServerTlsSettings, TlsProtocol};
pub use traffic_policy::{
    ClientTlsMode, ClientTlsSettings, ConnectionPoolSettings, ConsistentHashLb, H2UpgradePolicy,
    HashKey, HttpCookie, HttpPoolSettings, LbPolicy, LoadBalancerSettings, SimpleLb, TrafficPolicy,
};
pub use virtual_service::{
    CorsPolicy, Destination, HeaderOperations, Headers, HttpFilter, HttpFilterConfig,
    HttpInternalActiveRedirect, HttpMatchRequest, HttpRedirect, HttpRetry, HttpRewrite,
    HttpRoute, HttpRouteDestination, IpAccessControl, LocalRateLimit, Percent, PortSelector,
    RegexMatchAndSubstitute, TokenBucket, VirtualService,
};

use serde::{Deserialize, Serialize};

/// String matcher used for URIs, headers, query parameters and CORS origins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StringMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

impl StringMatch {
    pub fn exact(value: impl Into<String>) -> Self {
        Self::Exact(value.into())
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        Self::Prefix(value.into())
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self::Regex(value.into())
    }

    /// The matched value regardless of the match kind
    pub fn value(&self) -> &str {
        match self {
            Self::Exact(v) | Self::Prefix(v) | Self::Regex(v) => v,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, Self::Prefix(_))
    }
}

/// Serde helpers rendering `std::time::Duration` as `"<seconds>s"`
pub(crate) mod duration {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn format(value: &Duration) -> String {
        if value.subsec_nanos() == 0 {
            format!("{}s", value.as_secs())
        } else {
            format!("{}s", value.as_secs_f64())
        }
    }

    pub fn parse(raw: &str) -> Result<Duration, String> {
        let seconds = raw.strip_suffix('s').ok_or_else(|| format!("duration {raw:?} lacks 's'"))?;
        let seconds: f64 = seconds.parse().map_err(|_| format!("invalid duration {raw:?}"))?;
        Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => s.serialize_str(&super::format(d)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| super::parse(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn string_match_serializes_as_tagged_object() {
        let json = serde_json::to_value(StringMatch::regex(".*")).expect("serialize");
        assert_eq!(json, serde_json::json!({"regex": ".*"}));
        assert_eq!(StringMatch::prefix("/api").value(), "/api");
        assert!(StringMatch::prefix("/").is_prefix());
    }

    #[test]
    fn durations_render_in_seconds() {
        assert_eq!(duration::format(&Duration::from_secs(60)), "60s");
        assert_eq!(duration::format(&Duration::from_millis(1500)), "1.5s");
        assert_eq!(duration::parse("5s").expect("parse"), Duration::from_secs(5));
        assert!(duration::parse("5m").is_err());
    }
}
