//! Case-insensitive path matching.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::mesh::HttpRoute;
use serde::Serialize;

const IGNORE_PATH_CASE: &str = "ignore-path-case";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreCaseConfig {
    pub ignore_uri_case: bool,
}

pub struct IgnoreCase;

impl Parser for IgnoreCase {
    fn name(&self) -> &'static str {
        "ignore-case"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !annotations.has_native(IGNORE_PATH_CASE) {
            return Ok(Parsed::Absent);
        }
        let ignore_uri_case = annotations.parse_bool_native(IGNORE_PATH_CASE)?;
        config.ignore_case = Some(IgnoreCaseConfig { ignore_uri_case });
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for IgnoreCase {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        if !config.ignore_case.is_some_and(|c| c.ignore_uri_case) {
            return;
        }
        for matcher in &mut route.r#match {
            matcher.ignore_uri_case = true;
        }
    }
}
