//! Canary releases.
//!
//! A canary ingress shares host and path with a baseline ingress. Its route is
//! merged into the baseline route either as an extra weighted destination
//! ([`apply_by_weight`]) or as a separate route gated on a header or cookie
//! ([`apply_by_header`]). In both modes the canary destination falls back to
//! the baseline so upstream failures degrade to the stable version.

use super::header_control::HeaderControl;
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::mesh::{HttpRoute, StringMatch};
use serde::Serialize;
use tracing::{error, warn};

const ENABLE_CANARY: &str = "canary";
const CANARY_BY_HEADER: &str = "canary-by-header";
const CANARY_BY_HEADER_VALUE: &str = "canary-by-header-value";
const CANARY_BY_HEADER_PATTERN: &str = "canary-by-header-pattern";
const CANARY_BY_COOKIE: &str = "canary-by-cookie";
const CANARY_WEIGHT: &str = "canary-weight";
const CANARY_WEIGHT_TOTAL: &str = "canary-weight-total";

const DEFAULT_CANARY_WEIGHT_TOTAL: i32 = 100;
const ALWAYS: &str = "always";
const COOKIE_HEADER: &str = "cookie";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryConfig {
    pub enabled: bool,
    pub header: String,
    pub header_value: String,
    pub header_pattern: String,
    pub cookie: String,
    pub weight: i32,
    pub weight_total: i32,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: String::new(),
            header_value: String::new(),
            header_pattern: String::new(),
            cookie: String::new(),
            weight: 0,
            weight_total: DEFAULT_CANARY_WEIGHT_TOTAL,
        }
    }
}

impl CanaryConfig {
    /// Header and cookie matching take precedence over weights
    pub fn is_by_header(&self) -> bool {
        !self.header.is_empty() || !self.cookie.is_empty()
    }

    pub fn is_by_weight(&self) -> bool {
        !self.is_by_header()
    }
}

pub struct Canary;

impl Parser for Canary {
    fn name(&self) -> &'static str {
        "canary"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !annotations.has_asap(ENABLE_CANARY) {
            return Ok(Parsed::Absent);
        }

        let mut canary = CanaryConfig::default();
        let enabled = annotations.parse_bool_asap(ENABLE_CANARY);
        canary.enabled = *enabled.as_ref().unwrap_or(&false);
        if !canary.enabled {
            config.canary = Some(canary);
            return enabled.map(|_| Parsed::Applied);
        }

        canary.header = annotations.parse_string_asap(CANARY_BY_HEADER).unwrap_or_default();
        canary.header_value = annotations.parse_string_asap(CANARY_BY_HEADER_VALUE).unwrap_or_default();
        canary.header_pattern = annotations.parse_string_asap(CANARY_BY_HEADER_PATTERN).unwrap_or_default();
        canary.cookie = annotations.parse_string_asap(CANARY_BY_COOKIE).unwrap_or_default();

        match annotations.parse_int32_asap(CANARY_WEIGHT) {
            Ok(weight) => canary.weight = weight,
            Err(err) if !err.is_missing() => error!(error = %err, "ignoring canary weight"),
            Err(_) => {}
        }
        match annotations.parse_int32_asap(CANARY_WEIGHT_TOTAL) {
            Ok(total) if total > 0 => canary.weight_total = total,
            Ok(total) => warn!(total, "canary weight total must be positive, using 100"),
            Err(err) if !err.is_missing() => error!(error = %err, "ignoring canary weight total"),
            Err(_) => {}
        }

        config.canary = Some(canary);
        Ok(Parsed::Applied)
    }
}

/// Scale `weight` out of `total` to a 100 base, truncating
pub fn normalize_weight(total: i32, weight: i32) -> i32 {
    if total <= 0 {
        return 0;
    }
    (f64::from(weight) / f64::from(total) * 100.0) as i32
}

/// Append the canary destination of `canary` to the baseline `route`.
///
/// Route-level headers of a single-destination baseline move down to that
/// destination first. The canary's fallback chain is the baseline destination,
/// the baseline's own fallbacks, then every canary merged before it.
pub fn apply_by_weight(canary: &mut HttpRoute, route: &mut HttpRoute, canary_ingress: &Ingress) {
    let Some(config) = &canary_ingress.canary else {
        return;
    };
    if canary.route.is_empty() || route.route.is_empty() {
        return;
    }

    if route.route.len() == 1 {
        route.route[0].headers = route.headers.take();
    }

    HeaderControl.apply_route(canary, canary_ingress);

    let baseline = &route.route[0];
    let mut destination = canary.route[0].clone();
    destination.weight = config.weight;
    destination.headers = canary.headers.clone();
    destination.fallback_clusters = std::iter::once(baseline.destination.clone())
        .chain(baseline.fallback_clusters.iter().cloned())
        .chain(route.route[1..].iter().map(|earlier| earlier.destination.clone()))
        .collect();

    canary.route[0] = destination.clone();
    route.route.push(destination);
}

/// Turn `canary` into a header- or cookie-gated copy of the baseline `route`.
///
/// The canary keeps its own name and destinations and inherits everything
/// else, match conditions included, from the baseline.
pub fn apply_by_header(canary: &mut HttpRoute, route: &HttpRoute, canary_ingress: &Ingress) {
    let Some(config) = &canary_ingress.canary else {
        return;
    };
    if canary.route.is_empty() || route.route.is_empty() {
        return;
    }

    let name = std::mem::take(&mut canary.name);
    let destinations = std::mem::take(&mut canary.route);
    *canary = route.clone();
    canary.name = name;
    canary.route = destinations;

    let condition = if !config.header.is_empty() {
        let value = if !config.header_value.is_empty() {
            StringMatch::regex(format!("{ALWAYS}|{}", config.header_value))
        } else if !config.header_pattern.is_empty() {
            StringMatch::regex(config.header_pattern.clone())
        } else {
            StringMatch::exact(ALWAYS)
        };
        Some((config.header.clone(), value))
    } else if !config.cookie.is_empty() {
        Some((COOKIE_HEADER.to_string(), StringMatch::regex(cookie_pattern(&config.cookie))))
    } else {
        None
    };
    if let Some((header, value)) = condition {
        for matcher in &mut canary.r#match {
            matcher.headers.insert(header.clone(), value.clone());
        }
    }

    canary.headers = None;
    HeaderControl.apply_route(canary, canary_ingress);

    let baseline = &route.route[0];
    let destination = &mut canary.route[0];
    destination.headers = canary.headers.clone();
    destination.fallback_clusters.push(baseline.destination.clone());
    destination.fallback_clusters.extend(baseline.fallback_clusters.iter().cloned());
}

/// Recompute baseline weight after canaries were merged: canary weights are
/// scaled by `weight_total` and the baseline takes what is left of 100.
pub fn normalize_weights(route: &mut HttpRoute, weight_total: i32) {
    let Some((baseline, canaries)) = route.route.split_first_mut() else {
        return;
    };
    if canaries.is_empty() {
        baseline.weight = 100;
        return;
    }

    let mut used = 0;
    for canary in canaries.iter_mut() {
        canary.weight = normalize_weight(weight_total, canary.weight);
        used += canary.weight;
    }
    baseline.weight = (100 - used).max(0);
}

/// Header regex selecting requests whose cookie `name` is set to `always`
pub fn cookie_pattern(name: &str) -> String {
    format!(r"^(.\*?;)?({name}={ALWAYS})(;.\*)?$")
}
