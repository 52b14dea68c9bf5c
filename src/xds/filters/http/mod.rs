//! Conversion of HTTP filter attachments into Envoy typed configs.
//!
//! Attachments produced by the annotation handlers carry the ingress-level
//! model. Each one maps to the per-route config of a single Envoy HTTP filter.

pub mod local_rate_limit;
pub mod rbac;

use crate::mesh::{HttpFilter, HttpFilterConfig};
use crate::xds::filters::{Base64Bytes, TypedConfig};
use envoy_types::pb::google::protobuf::Any as EnvoyAny;
use std::collections::BTreeMap;
use tracing::error;

pub const RBAC_FILTER_NAME: &str = "envoy.filters.http.rbac";
pub const LOCAL_RATE_LIMIT_FILTER_NAME: &str = "envoy.filters.http.local_ratelimit";

/// Envoy filter the attachment configures
pub fn envoy_filter_name(filter: &HttpFilter) -> &'static str {
    match filter.filter {
        HttpFilterConfig::IpAccessControl(_) => RBAC_FILTER_NAME,
        HttpFilterConfig::LocalRateLimit(_) => LOCAL_RATE_LIMIT_FILTER_NAME,
    }
}

/// Per-route `Any` payload for one attachment
pub fn filter_to_any(filter: &HttpFilter) -> Result<EnvoyAny, crate::Error> {
    match &filter.filter {
        HttpFilterConfig::IpAccessControl(config) => rbac::to_any(config),
        HttpFilterConfig::LocalRateLimit(config) => local_rate_limit::to_any(config),
    }
}

/// `typed_per_filter_config` map keyed by Envoy filter name.
///
/// Disabled attachments are left out. An attachment that fails to convert is
/// logged and dropped; later attachments for the same filter win.
pub fn typed_per_filter_config(filters: &[HttpFilter]) -> BTreeMap<String, TypedConfig> {
    let mut configs = BTreeMap::new();
    for filter in filters.iter().filter(|f| !f.disable) {
        match filter_to_any(filter) {
            Ok(any) => {
                configs.insert(
                    envoy_filter_name(filter).to_string(),
                    TypedConfig { type_url: any.type_url, value: Base64Bytes(any.value) },
                );
            }
            Err(err) => error!(filter = %filter.name, error = %err, "dropping http filter attachment"),
        }
    }
    configs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{IpAccessControl, LocalRateLimit, TokenBucket};
    use std::time::Duration;

    fn ip_filter(blocks: &[&str]) -> HttpFilter {
        HttpFilter {
            name: "ip-access-control".into(),
            disable: false,
            filter: HttpFilterConfig::IpAccessControl(IpAccessControl {
                remote_ip_blocks: blocks.iter().map(|b| b.to_string()).collect(),
                ..Default::default()
            }),
        }
    }

    fn rate_limit() -> HttpFilter {
        HttpFilter {
            name: "local-rate-limit".into(),
            disable: false,
            filter: HttpFilterConfig::LocalRateLimit(LocalRateLimit {
                token_bucket: TokenBucket { max_tokens: 5, tokens_per_fill: 1, fill_interval: Duration::from_secs(1) },
                status_code: 503,
            }),
        }
    }

    #[test]
    fn dispatches_on_attachment_kind() {
        assert_eq!(filter_to_any(&ip_filter(&["1.1.1.1"])).expect("rbac").type_url, rbac::RBAC_PER_ROUTE_TYPE_URL);
        assert_eq!(
            filter_to_any(&rate_limit()).expect("local rate limit").type_url,
            local_rate_limit::LOCAL_RATE_LIMIT_TYPE_URL
        );
    }

    #[test]
    fn per_filter_map_skips_disabled_and_invalid() {
        let mut disabled = rate_limit();
        disabled.disable = true;
        let configs = typed_per_filter_config(&[ip_filter(&["bogus"]), disabled]);
        assert!(configs.is_empty());

        let configs = typed_per_filter_config(&[ip_filter(&["10.0.0.0/8"]), rate_limit()]);
        assert_eq!(configs.keys().collect::<Vec<_>>(), vec![LOCAL_RATE_LIMIT_FILTER_NAME, RBAC_FILTER_NAME]);
    }
}
