//! Extra request match conditions on methods, headers, pseudo-headers and
//! query parameters.
//!
//! Keys follow `{exact|regex|prefix}-match-{header|pseudo-header|query}-<name>`
//! under the native prefix only. Pseudo-header names gain a leading `:`.

use super::accessor::normalize;
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::errors::AnnotationError;
use crate::mesh::{HttpRoute, StringMatch};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, warn};

const MATCH_METHOD: &str = "match-method";
const MATCH_HEADER: &str = "match-header-";
const MATCH_PSEUDO_HEADER: &str = "match-pseudo-header-";
const MATCH_QUERY: &str = "match-query-";

const METHODS: [&str; 9] = ["GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    pub methods: Vec<String>,
    pub headers: BTreeMap<String, StringMatch>,
    pub query_params: BTreeMap<String, StringMatch>,
}

pub struct RouteMatch;

enum Target {
    Header,
    PseudoHeader,
    Query,
}

impl Parser for RouteMatch {
    fn name(&self) -> &'static str {
        "match"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        let mut conditions = Vec::new();
        for (feature, raw) in annotations.native_entries() {
            match classify(feature) {
                Some(Ok(condition)) => conditions.push((condition, normalize(raw))),
                Some(Err(err)) => error!(error = %err, "ignoring match annotation"),
                None => {}
            }
        }
        if conditions.is_empty() && !annotations.has_native(MATCH_METHOD) {
            return Ok(Parsed::Absent);
        }

        let mut matches = MatchConfig::default();
        for ((target, name, kind), value) in conditions {
            let matcher = match kind {
                "exact" => StringMatch::exact(value),
                "prefix" => StringMatch::prefix(value),
                _ => StringMatch::regex(value),
            };
            match target {
                Target::Header => matches.headers.insert(name, matcher),
                Target::PseudoHeader => matches.headers.insert(format!(":{name}"), matcher),
                Target::Query => matches.query_params.insert(name, matcher),
            };
        }

        if let Ok(raw) = annotations.parse_string_native(MATCH_METHOD) {
            matches.methods = parse_methods(&raw);
        }

        config.r#match = Some(matches);
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for RouteMatch {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(matches) = &config.r#match else {
            return;
        };

        let method = (!matches.methods.is_empty()).then(|| StringMatch::regex(matches.methods.join("|")));
        for request in &mut route.r#match {
            if let Some(method) = &method {
                request.method = Some(method.clone());
            }
            for (name, matcher) in &matches.headers {
                request.headers.entry(name.clone()).or_insert_with(|| matcher.clone());
            }
            for (name, matcher) in &matches.query_params {
                request.query_params.entry(name.clone()).or_insert_with(|| matcher.clone());
            }
            debug!(route = %route.name, headers = request.headers.len(), "applied match conditions");
        }
    }
}

/// `None` for keys unrelated to matching, otherwise the parsed
/// `(target, name, kind)` or why the key is malformed
fn classify(feature: &str) -> Option<Result<(Target, String, &str), AnnotationError>> {
    let (kind, rest) = feature.split_once('-')?;
    if !matches!(kind, "exact" | "regex" | "prefix") {
        return None;
    }
    let (target, name) = if let Some(name) = rest.strip_prefix(MATCH_HEADER) {
        (Target::Header, name)
    } else if let Some(name) = rest.strip_prefix(MATCH_PSEUDO_HEADER) {
        (Target::PseudoHeader, name)
    } else if let Some(name) = rest.strip_prefix(MATCH_QUERY) {
        (Target::Query, name)
    } else {
        return None;
    };
    if name.is_empty() {
        return Some(Err(AnnotationError::InvalidName { key: feature.to_string() }));
    }
    Some(Ok((target, name.to_string(), kind)))
}

/// Space separated, case-insensitive, deduplicated; unknown methods are dropped
fn parse_methods(raw: &str) -> Vec<String> {
    let mut methods: Vec<String> = Vec::new();
    for method in raw.split_whitespace().map(str::to_ascii_uppercase) {
        if !METHODS.contains(&method.as_str()) {
            warn!(method = %method, "ignoring unknown http method");
            continue;
        }
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    methods
}
