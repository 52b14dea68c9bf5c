//! Per-route token bucket rate limiting.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::errors::AnnotationError;
use crate::mesh::{HttpFilter, HttpFilterConfig, HttpRoute, LocalRateLimit as LocalRateLimitFilter, TokenBucket};
use serde::Serialize;
use std::time::Duration;

const LIMIT_RPM: &str = "route-limit-rpm";
const LIMIT_RPS: &str = "route-limit-rps";
const LIMIT_BURST_MULTIPLIER: &str = "route-limit-burst-multiplier";

const DEFAULT_BURST_MULTIPLIER: u32 = 5;
const DEFAULT_STATUS_CODE: u32 = 503;
const MINUTE: Duration = Duration::from_secs(60);
const SECOND: Duration = Duration::from_secs(1);

pub const FILTER_NAME: &str = "local-rate-limit";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRateLimitConfig {
    pub tokens_per_fill: u32,
    pub max_tokens: u32,
    #[serde(with = "crate::mesh::duration")]
    pub fill_interval: Duration,
}

impl LocalRateLimitConfig {
    /// Bucket refilled with `limit` tokens every `interval`, holding at most
    /// `limit * multiplier`
    pub fn from_limit(limit: u32, multiplier: u32, interval: Duration) -> Self {
        Self {
            tokens_per_fill: limit,
            max_tokens: limit.saturating_mul(multiplier),
            fill_interval: interval,
        }
    }
}

pub struct LocalRateLimit;

impl Parser for LocalRateLimit {
    fn name(&self) -> &'static str {
        "local-rate-limit"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !need_local_rate_limit_config(annotations) {
            return Ok(Parsed::Absent);
        }

        let multiplier = match annotations.parse_uint32_native(LIMIT_BURST_MULTIPLIER) {
            Ok(multiplier) if multiplier > 0 => multiplier,
            Ok(_) => DEFAULT_BURST_MULTIPLIER,
            Err(err) if err.is_missing() => DEFAULT_BURST_MULTIPLIER,
            Err(err) => return Err(err),
        };

        let limit = match annotations.parse_uint32_native(LIMIT_RPM) {
            Ok(rpm) => (rpm, MINUTE),
            Err(err) if err.is_missing() => (annotations.parse_uint32_native(LIMIT_RPS)?, SECOND),
            Err(err) => return Err(err),
        };
        if limit.0 == 0 {
            let key = if limit.1 == MINUTE { LIMIT_RPM } else { LIMIT_RPS };
            return Err(AnnotationError::invalid_value(key, "0", "limit must be positive"));
        }

        config.local_rate_limit = Some(LocalRateLimitConfig::from_limit(limit.0, multiplier, limit.1));
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for LocalRateLimit {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(limit) = &config.local_rate_limit else {
            return;
        };

        route.route_http_filters.push(HttpFilter {
            name: FILTER_NAME.to_string(),
            disable: false,
            filter: HttpFilterConfig::LocalRateLimit(LocalRateLimitFilter {
                token_bucket: TokenBucket {
                    max_tokens: limit.max_tokens,
                    tokens_per_fill: limit.tokens_per_fill,
                    fill_interval: limit.fill_interval,
                },
                status_code: DEFAULT_STATUS_CODE,
            }),
        });
    }
}

fn need_local_rate_limit_config(annotations: &Annotations) -> bool {
    annotations.has_native(LIMIT_RPM) || annotations.has_native(LIMIT_RPS)
}
