//! Upstream retry policy.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::mesh::{HttpRetry, HttpRoute};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

const RETRY_COUNT: &str = "proxy-next-upstream-tries";
const PER_RETRY_TIMEOUT: &str = "proxy-next-upstream-timeout";
const RETRY_ON: &str = "proxy-next-upstream";

const DEFAULT_RETRY_COUNT: i32 = 3;
const DEFAULT_RETRY_ON: &str = "5xx";
const RETRY_STATUS_CODE: &str = "retriable-status-codes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub retry_count: i32,
    pub per_retry_timeout_secs: Option<u64>,
    pub retry_on: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            per_retry_timeout_secs: None,
            retry_on: DEFAULT_RETRY_ON.to_string(),
        }
    }
}

pub struct Retry;

impl Parser for Retry {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !need_retry_config(annotations) {
            return Ok(Parsed::Absent);
        }

        let mut retry = RetryConfig::default();

        match annotations.parse_int32_asap(RETRY_COUNT) {
            Ok(count) if count >= 0 => retry.retry_count = count,
            Ok(count) => warn!(count, "negative retry count, using 3"),
            Err(err) if !err.is_missing() => error!(error = %err, "ignoring retry count"),
            Err(_) => {}
        }
        match annotations.parse_int_asap(PER_RETRY_TIMEOUT) {
            Ok(secs) if secs > 0 => retry.per_retry_timeout_secs = u64::try_from(secs).ok(),
            Ok(_) => {}
            Err(err) if !err.is_missing() => error!(error = %err, "ignoring per retry timeout"),
            Err(_) => {}
        }

        if let Ok(conditions) = annotations.parse_string_asap(RETRY_ON) {
            match convert_retry_on(&conditions) {
                Some(retry_on) => retry.retry_on = retry_on,
                None => retry.retry_count = 0,
            }
        }

        config.retry = Some(retry);
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for Retry {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(retry) = &config.retry else {
            return;
        };

        route.retries = Some(HttpRetry {
            attempts: retry.retry_count,
            per_try_timeout: retry.per_retry_timeout_secs.map(Duration::from_secs),
            retry_on: retry.retry_on.clone(),
        });
    }
}

/// Translate nginx `proxy_next_upstream` conditions to Envoy `retry_on`.
/// `None` means retries are switched off.
fn convert_retry_on(raw: &str) -> Option<String> {
    let mut conditions: Vec<String> = Vec::new();
    let mut status_codes = Vec::new();
    let mut push = |condition: &str| {
        if !conditions.iter().any(|c| c == condition) {
            conditions.push(condition.to_string());
        }
    };

    for token in raw.split([',', ' ']).map(str::trim).filter(|t| !t.is_empty()) {
        match token {
            "off" => return None,
            "error" | "timeout" | "invalid_header" | "http_5xx" => push(DEFAULT_RETRY_ON),
            "non_idempotent" => push("non_idempotent"),
            other => match other.strip_prefix("http_").filter(|code| code.parse::<u16>().is_ok()) {
                Some(code) => status_codes.push(code.to_string()),
                None => warn!(condition = other, "unsupported retry condition"),
            },
        }
    }

    if !status_codes.is_empty() {
        push(RETRY_STATUS_CODE);
    }
    let mut out = conditions;
    out.extend(status_codes);
    if out.is_empty() {
        out.push(DEFAULT_RETRY_ON.to_string());
    }
    Some(out.join(","))
}

fn need_retry_config(annotations: &Annotations) -> bool {
    annotations.has_asap(RETRY_COUNT)
        || annotations.has_asap(PER_RETRY_TIMEOUT)
        || annotations.has_asap(RETRY_ON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;

    fn parse(pairs: &[(String, &str)]) -> Option<RetryConfig> {
        let mut config = ingress("default", "web");
        let _ = Retry.parse(&annotations(pairs), &mut config, &mut GlobalContext::default());
        config.retry
    }

    #[test]
    fn defaults_to_three_attempts_on_5xx() {
        assert!(parse(&[]).is_none());
        assert_eq!(parse(&[(nginx(PER_RETRY_TIMEOUT), "5")]), Some(RetryConfig {
            per_retry_timeout_secs: Some(5),
            ..Default::default()
        }));
    }

    #[test]
    fn off_disables_retries() {
        let retry = parse(&[(nginx(RETRY_COUNT), "2"), (nginx(RETRY_ON), "error,off")]).expect("retry");
        assert_eq!(retry.retry_count, 0);
    }

    #[test]
    fn conditions_are_translated() {
        assert_eq!(convert_retry_on("error timeout http_5xx").as_deref(), Some("5xx"));
        assert_eq!(convert_retry_on("non_idempotent").as_deref(), Some("non_idempotent"));
        assert_eq!(
            convert_retry_on("error,http_502,http_503").as_deref(),
            Some("5xx,retriable-status-codes,502,503")
        );
        assert_eq!(convert_retry_on("http_404,bogus").as_deref(), Some("retriable-status-codes,404"));
        assert_eq!(convert_retry_on("bogus").as_deref(), Some("5xx"));
    }

    #[test]
    fn route_retries_are_emitted() {
        let mut config = ingress("default", "web");
        config.retry = Some(RetryConfig { retry_count: 2, per_retry_timeout_secs: Some(3), retry_on: "5xx".into() });
        let mut route = HttpRoute::default();
        Retry.apply_route(&mut route, &config);
        assert_eq!(
            route.retries,
            Some(HttpRetry { attempts: 2, per_try_timeout: Some(Duration::from_secs(3)), retry_on: "5xx".into() })
        );
    }
}
