//! Local Rate Limit per-route configuration

use crate::mesh::LocalRateLimit as LocalRateLimitAttachment;
use crate::xds::filters::{any_from_message, invalid_config};
use envoy_types::pb::envoy::config::core::v3::RuntimeFractionalPercent;
use envoy_types::pb::envoy::extensions::filters::http::local_ratelimit::v3::LocalRateLimit;
use envoy_types::pb::envoy::r#type::v3::{fractional_percent, FractionalPercent, HttpStatus, TokenBucket};
use envoy_types::pb::google::protobuf::{Any as EnvoyAny, Duration as ProtoDuration, UInt32Value};
use std::time::Duration;

pub const LOCAL_RATE_LIMIT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.local_ratelimit.v3.LocalRateLimit";

const STAT_PREFIX: &str = "http_local_rate_limiter";

/// Envoy ignores the bucket unless the filter is enabled and enforced explicitly
fn hundred_percent() -> RuntimeFractionalPercent {
    RuntimeFractionalPercent {
        runtime_key: String::new(),
        default_value: Some(FractionalPercent {
            numerator: 100,
            denominator: fractional_percent::DenominatorType::Hundred as i32,
        }),
    }
}

fn proto_duration(duration: Duration) -> Result<ProtoDuration, crate::Error> {
    if duration.is_zero() {
        return Err(invalid_config("local rate limit fill interval must be greater than 0"));
    }
    let seconds = i64::try_from(duration.as_secs())
        .map_err(|_| invalid_config("local rate limit fill interval is too large"))?;
    // subsec_nanos is always below 1e9
    let nanos = i32::try_from(duration.subsec_nanos()).unwrap_or_default();
    Ok(ProtoDuration { seconds, nanos })
}

pub fn to_proto(config: &LocalRateLimitAttachment) -> Result<LocalRateLimit, crate::Error> {
    let bucket = &config.token_bucket;
    if bucket.max_tokens == 0 {
        return Err(invalid_config("local rate limit max_tokens must be greater than 0"));
    }
    let code = i32::try_from(config.status_code).unwrap_or(i32::MAX).clamp(400, 599);

    Ok(LocalRateLimit {
        stat_prefix: STAT_PREFIX.to_string(),
        status: Some(HttpStatus { code }),
        token_bucket: Some(TokenBucket {
            max_tokens: bucket.max_tokens,
            tokens_per_fill: Some(UInt32Value { value: bucket.tokens_per_fill }),
            fill_interval: Some(proto_duration(bucket.fill_interval)?),
        }),
        filter_enabled: Some(hundred_percent()),
        filter_enforced: Some(hundred_percent()),
        ..Default::default()
    })
}

pub fn to_any(config: &LocalRateLimitAttachment) -> Result<EnvoyAny, crate::Error> {
    Ok(any_from_message(LOCAL_RATE_LIMIT_TYPE_URL, &to_proto(config)?))
}
