//! Whole-request timeout for every route of the ingress.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::errors::AnnotationError;
use crate::mesh::HttpRoute;
use serde::Serialize;
use std::time::Duration;

const TIMEOUT: &str = "timeout";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutConfig {
    #[serde(with = "crate::mesh::duration")]
    pub time: Duration,
}

pub struct Timeout;

impl Parser for Timeout {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !annotations.has_native(TIMEOUT) {
            return Ok(Parsed::Absent);
        }

        let secs = annotations.parse_int_native(TIMEOUT)?;
        let secs = u64::try_from(secs)
            .map_err(|_| AnnotationError::invalid_value(TIMEOUT, secs.to_string(), "timeout must not be negative"))?;

        config.timeout = Some(TimeoutConfig { time: Duration::from_secs(secs) });
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for Timeout {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        if let Some(timeout) = config.timeout {
            route.timeout = Some(timeout.time);
        }
    }
}
