//! Upstream load balancing: cookie affinity, consistent hashing on a request
//! attribute, or a simple policy. Cookie affinity beats hashing, which beats
//! the simple policy.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, TrafficPolicyHandler};
use crate::mesh::{
    ConsistentHashLb, HashKey, HttpCookie, LbPolicy, LoadBalancerSettings, SimpleLb, TrafficPolicy,
};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

const LOAD_BALANCE: &str = "load-balance";
const UPSTREAM_HASH_BY: &str = "upstream-hash-by";
const AFFINITY: &str = "affinity";
const AFFINITY_MODE: &str = "affinity-mode";
const SESSION_COOKIE_NAME: &str = "session-cookie-name";
const SESSION_COOKIE_PATH: &str = "session-cookie-path";
const SESSION_COOKIE_MAX_AGE: &str = "session-cookie-max-age";
const SESSION_COOKIE_EXPIRES: &str = "session-cookie-expires";
const WARMUP: &str = "warmup";

const HEADER_INDICATOR: &str = "$http_";
const QUERY_PARAM_INDICATOR: &str = "$arg_";
const DEFAULT_AFFINITY_COOKIE_NAME: &str = "INGRESSCOOKIE";
const DEFAULT_AFFINITY_COOKIE_PATH: &str = "/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AffinityMode {
    #[default]
    Balanced,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieAffinity {
    pub name: String,
    pub path: String,
    pub max_age_secs: u64,
    pub mode: AffinityMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HashPolicy {
    Cookie(CookieAffinity),
    Header(String),
    QueryParam(String),
    SourceIp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalanceConfig {
    pub simple: SimpleLb,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_secs: Option<u64>,
}

pub struct LoadBalance;

impl Parser for LoadBalance {
    fn name(&self) -> &'static str {
        "load-balance"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !need_load_balance_config(annotations) {
            return Ok(Parsed::Absent);
        }

        let mut lb = LoadBalanceConfig::default();

        if is_cookie_affinity(annotations) {
            lb.hash = Some(HashPolicy::Cookie(cookie_affinity(annotations)));
        } else if annotations.has_asap(UPSTREAM_HASH_BY) {
            lb.hash = annotations
                .parse_string_asap(UPSTREAM_HASH_BY)
                .ok()
                .and_then(|key| hash_policy_for(&key));
        } else if let Ok(policy) = annotations.parse_string_asap(LOAD_BALANCE) {
            match SimpleLb::from_annotation(&policy) {
                Some(simple) => lb.simple = simple,
                None => warn!(policy = %policy, "unknown load balance policy, using round robin"),
            }
        }

        match annotations.parse_int_native(WARMUP) {
            Ok(secs) if secs > 0 => lb.warmup_secs = u64::try_from(secs).ok(),
            Ok(_) => {}
            Err(err) if !err.is_missing() => error!(error = %err, "ignoring warmup"),
            Err(_) => {}
        }

        config.load_balance = Some(lb);
        Ok(Parsed::Applied)
    }
}

impl TrafficPolicyHandler for LoadBalance {
    fn apply_traffic_policy(&self, policy: &mut TrafficPolicy, config: &Ingress) {
        let Some(lb) = &config.load_balance else {
            return;
        };

        let hash_key = match &lb.hash {
            Some(HashPolicy::Cookie(cookie)) => Some(HashKey::HttpCookie(HttpCookie {
                name: cookie.name.clone(),
                path: cookie.path.clone(),
                ttl: Some(Duration::from_secs(cookie.max_age_secs)),
            })),
            Some(HashPolicy::Header(header)) => Some(HashKey::HttpHeaderName(header.clone())),
            Some(HashPolicy::QueryParam(param)) => Some(HashKey::HttpQueryParameterName(param.clone())),
            Some(HashPolicy::SourceIp) => Some(HashKey::UseSourceIp(true)),
            None => None,
        };

        policy.load_balancer = Some(LoadBalancerSettings {
            policy: match hash_key {
                Some(hash_key) => LbPolicy::ConsistentHash(ConsistentHashLb { hash_key }),
                None => LbPolicy::Simple(lb.simple),
            },
            warmup_duration_secs: lb.warmup_secs.map(Duration::from_secs),
        });
    }
}

/// Map an nginx `upstream-hash-by` variable to a hash policy. Only single
/// variables are understood; anything else leaves the simple policy active.
fn hash_policy_for(key: &str) -> Option<HashPolicy> {
    match key {
        "$request_uri" => Some(HashPolicy::Header(":path".to_string())),
        "$host" => Some(HashPolicy::Header(":authority".to_string())),
        "$remote_addr" => Some(HashPolicy::SourceIp),
        _ => {
            if let Some(header) = key.strip_prefix(HEADER_INDICATOR).filter(|h| !h.is_empty()) {
                Some(HashPolicy::Header(header.to_string()))
            } else if let Some(param) = key.strip_prefix(QUERY_PARAM_INDICATOR).filter(|p| !p.is_empty()) {
                Some(HashPolicy::QueryParam(param.to_string()))
            } else {
                warn!(key, "unsupported upstream hash key");
                None
            }
        }
    }
}

fn cookie_affinity(annotations: &Annotations) -> CookieAffinity {
    let mut cookie = CookieAffinity {
        name: annotations
            .parse_string_asap(SESSION_COOKIE_NAME)
            .unwrap_or_else(|_| DEFAULT_AFFINITY_COOKIE_NAME.to_string()),
        path: annotations
            .parse_string_asap(SESSION_COOKIE_PATH)
            .unwrap_or_else(|_| DEFAULT_AFFINITY_COOKIE_PATH.to_string()),
        max_age_secs: 0,
        mode: AffinityMode::default(),
    };

    let age = annotations
        .parse_int_asap(SESSION_COOKIE_MAX_AGE)
        .or_else(|_| annotations.parse_int_asap(SESSION_COOKIE_EXPIRES));
    match age {
        Ok(age) => cookie.max_age_secs = u64::try_from(age).unwrap_or_default(),
        Err(err) if !err.is_missing() => error!(error = %err, "ignoring session cookie age"),
        Err(_) => {}
    }

    if let Ok(mode) = annotations.parse_string_asap(AFFINITY_MODE) {
        cookie.mode = match mode.as_str() {
            "balanced" => AffinityMode::Balanced,
            "persistent" => AffinityMode::Persistent,
            other => {
                warn!(mode = other, "unknown affinity mode, using balanced");
                AffinityMode::Balanced
            }
        };
    }
    cookie
}

fn is_cookie_affinity(annotations: &Annotations) -> bool {
    annotations.parse_string_asap(AFFINITY).is_ok_and(|value| value == "cookie")
}

fn need_load_balance_config(annotations: &Annotations) -> bool {
    annotations.has_asap(LOAD_BALANCE)
        || annotations.has_asap(UPSTREAM_HASH_BY)
        || is_cookie_affinity(annotations)
        || annotations.has_native(WARMUP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;

    fn parse(pairs: &[(String, &str)]) -> Option<LoadBalanceConfig> {
        let mut config = ingress("default", "web");
        let _ = LoadBalance.parse(&annotations(pairs), &mut config, &mut GlobalContext::default());
        config.load_balance
    }

    fn apply(lb: LoadBalanceConfig) -> LoadBalancerSettings {
        let mut config = ingress("default", "web");
        config.load_balance = Some(lb);
        let mut policy = TrafficPolicy::default();
        LoadBalance.apply_traffic_policy(&mut policy, &config);
        policy.load_balancer.expect("load balancer")
    }

    #[test]
    fn cookie_affinity_defaults_and_wins() {
        let lb = parse(&[(nginx(AFFINITY), "cookie"), (nginx(UPSTREAM_HASH_BY), "$host")]).expect("lb");
        assert_eq!(
            lb.hash,
            Some(HashPolicy::Cookie(CookieAffinity {
                name: "INGRESSCOOKIE".into(),
                path: "/".into(),
                max_age_secs: 0,
                mode: AffinityMode::Balanced,
            }))
        );
    }

    #[test]
    fn max_age_beats_expires() {
        let lb = parse(&[
            (nginx(AFFINITY), "cookie"),
            (nginx(SESSION_COOKIE_NAME), "test"),
            (nginx(SESSION_COOKIE_EXPIRES), "10"),
            (native(SESSION_COOKIE_MAX_AGE), "100"),
        ])
        .expect("lb");
        let Some(HashPolicy::Cookie(cookie)) = lb.hash else {
            panic!("expected cookie affinity");
        };
        assert_eq!((cookie.name.as_str(), cookie.max_age_secs), ("test", 100));

        let lb = parse(&[(nginx(AFFINITY), "cookie"), (nginx(SESSION_COOKIE_EXPIRES), "10")]).expect("lb");
        assert!(matches!(lb.hash, Some(HashPolicy::Cookie(CookieAffinity { max_age_secs: 10, .. }))));
    }

    #[test]
    fn non_cookie_affinity_is_not_requested() {
        assert!(parse(&[(nginx(AFFINITY), "ip")]).is_none());
    }

    #[test]
    fn hash_keys_map_variables() {
        assert_eq!(hash_policy_for("$request_uri"), Some(HashPolicy::Header(":path".into())));
        assert_eq!(hash_policy_for("$host"), Some(HashPolicy::Header(":authority".into())));
        assert_eq!(hash_policy_for("$remote_addr"), Some(HashPolicy::SourceIp));
        assert_eq!(hash_policy_for("$http_x_user"), Some(HashPolicy::Header("x_user".into())));
        assert_eq!(hash_policy_for("$arg_id"), Some(HashPolicy::QueryParam("id".into())));
        assert_eq!(hash_policy_for("$request_uri$host"), None);
        assert_eq!(hash_policy_for("abc"), None);
    }

    #[test]
    fn simple_policy_and_warmup() {
        let lb = parse(&[(nginx(LOAD_BALANCE), "ewma"), (native(WARMUP), "60")]).expect("lb");
        assert_eq!(lb.simple, SimpleLb::LeastConn);
        assert_eq!(lb.warmup_secs, Some(60));

        let lb = parse(&[(nginx(LOAD_BALANCE), "maglev")]).expect("lb");
        assert_eq!(lb.simple, SimpleLb::RoundRobin);

        assert!(parse(&[(nginx(WARMUP), "60")]).is_none());
    }

    #[test]
    fn projects_onto_traffic_policy() {
        let settings = apply(LoadBalanceConfig {
            hash: Some(HashPolicy::SourceIp),
            warmup_secs: Some(30),
            ..Default::default()
        });
        assert_eq!(
            settings,
            LoadBalancerSettings {
                policy: LbPolicy::ConsistentHash(ConsistentHashLb { hash_key: HashKey::UseSourceIp(true) }),
                warmup_duration_secs: Some(Duration::from_secs(30)),
            }
        );

        let settings = apply(LoadBalanceConfig { simple: SimpleLb::Random, ..Default::default() });
        assert_eq!(settings.policy, LbPolicy::Simple(SimpleLb::Random));
    }
}
