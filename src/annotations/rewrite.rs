//! Path and host rewriting.
//!
//! `rewrite-target` is an nginx-style substitution whose `$N` backreferences are
//! translated to RE2 `\N`. `rewrite-path` is a literal replacement and takes
//! priority over the target when both are set.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::mesh::{HttpRewrite, HttpRoute, RegexMatchAndSubstitute};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::error;

const REWRITE_TARGET: &str = "rewrite-target";
const USE_REGEX: &str = "use-regex";
const FULL_PATH_REGEX: &str = "full-path-regex";
const UPSTREAM_VHOST: &str = "upstream-vhost";
const REWRITE_PATH: &str = "rewrite-path";

static BACKREFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([0-9])").expect("valid backreference regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteConfig {
    pub rewrite_target: String,
    pub use_regex: bool,
    pub full_path_regex: bool,
    pub rewrite_host: String,
    pub rewrite_path: String,
}

impl RewriteConfig {
    /// Whether the owning route's path matcher must switch to regex matching
    pub fn need_regex_match(&self) -> bool {
        self.use_regex || self.full_path_regex || !self.rewrite_target.is_empty()
    }
}

pub struct Rewrite;

impl Parser for Rewrite {
    fn name(&self) -> &'static str {
        "rewrite"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !need_rewrite_config(annotations) {
            return Ok(Parsed::Absent);
        }

        let mut rewrite = RewriteConfig {
            rewrite_path: annotations.parse_string_native(REWRITE_PATH).unwrap_or_default(),
            rewrite_host: annotations.parse_string_asap(UPSTREAM_VHOST).unwrap_or_default(),
            ..Default::default()
        };

        match annotations.parse_bool_asap(USE_REGEX) {
            Ok(value) => rewrite.use_regex = value,
            Err(err) if !err.is_missing() => error!(error = %err, "ignoring use-regex"),
            Err(_) => {}
        }
        match annotations.parse_bool_native(FULL_PATH_REGEX) {
            Ok(value) => rewrite.full_path_regex = value,
            Err(err) if !err.is_missing() => error!(error = %err, "ignoring full-path-regex"),
            Err(_) => {}
        }

        if rewrite.rewrite_path.is_empty() {
            if let Ok(target) = annotations.parse_string_asap(REWRITE_TARGET) {
                rewrite.rewrite_target = convert_to_re2(&target);
            }
        }

        config.rewrite = Some(rewrite);
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for Rewrite {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(rewrite) = &config.rewrite else {
            return;
        };
        if rewrite.rewrite_target.is_empty()
            && rewrite.rewrite_path.is_empty()
            && rewrite.rewrite_host.is_empty()
        {
            return;
        }

        let mut out = HttpRewrite::default();
        if !rewrite.rewrite_path.is_empty() {
            let mut uri = rewrite.rewrite_path.clone();
            let prefix_with_slash = route
                .r#match
                .iter()
                .filter_map(|m| m.uri.as_ref())
                .any(|uri| uri.is_prefix() && uri.value().ends_with('/'));
            if prefix_with_slash && !uri.ends_with('/') {
                uri.push('/');
            }
            out.uri = uri;
        } else if !rewrite.rewrite_target.is_empty() {
            if let Some(uri) = route.first_uri() {
                out.uri_regex = Some(RegexMatchAndSubstitute {
                    pattern: uri.value().to_string(),
                    substitution: rewrite.rewrite_target.clone(),
                });
            }
        }
        out.authority = rewrite.rewrite_host.clone();

        route.rewrite = Some(out);
    }
}

/// Translate nginx `$N` backreferences to RE2 `\N`; other `$` tokens are kept.
/// The capture index is not checked against the match pattern.
pub fn convert_to_re2(target: &str) -> String {
    BACKREFERENCE.replace_all(target, r"\$1").into_owned()
}

fn need_rewrite_config(annotations: &Annotations) -> bool {
    annotations.has_asap(REWRITE_TARGET)
        || annotations.has_asap(USE_REGEX)
        || annotations.has_asap(UPSTREAM_VHOST)
        || annotations.has_native(REWRITE_PATH)
        || annotations.has_native(FULL_PATH_REGEX)
}
