//! Explicit weighted destinations replacing the backend of every route.
//!
//! One destination per line: `[NN%] host[:port] [subset]`. A missing weight
//! counts as 100. Hosts may themselves contain colons (service discovery
//! names), so a trailing `:digits` is a port only when it is a valid port.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::errors::AnnotationError;
use crate::mesh::{Destination, HttpRoute, HttpRouteDestination, PortSelector};
use serde::Serialize;
use tracing::warn;

const DESTINATION: &str = "destination";

const DEFAULT_WEIGHT: i32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    pub destinations: Vec<HttpRouteDestination>,
    pub weight_sum: i64,
}

pub struct DestinationOverride;

impl Parser for DestinationOverride {
    fn name(&self) -> &'static str {
        "destination"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !annotations.has_native(DESTINATION) {
            return Ok(Parsed::Absent);
        }

        let block = annotations.parse_string_native(DESTINATION)?;
        let destinations = parse_destinations(&block)?;
        let weight_sum: i64 = destinations.iter().map(|d| i64::from(d.weight)).sum();
        if weight_sum != 100 {
            warn!(ingress = %config.meta.key(), weight_sum, "destination weights do not sum to 100");
        }

        config.destination = Some(DestinationConfig { destinations, weight_sum });
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for DestinationOverride {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(destination) = config.destination.as_ref().filter(|d| !d.destinations.is_empty()) else {
            return;
        };
        route.route = destination.destinations.clone();
    }
}

pub fn parse_destinations(block: &str) -> Result<Vec<HttpRouteDestination>, AnnotationError> {
    let mut destinations = Vec::new();
    for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
        destinations.push(parse_line(line)?);
    }
    Ok(destinations)
}

fn parse_line(line: &str) -> Result<HttpRouteDestination, AnnotationError> {
    let invalid = |reason: &str| AnnotationError::invalid_value(DESTINATION, line, reason);
    let mut tokens = line.split_whitespace().peekable();

    let mut weight = DEFAULT_WEIGHT;
    if let Some(raw) = tokens.peek().and_then(|t| t.strip_suffix('%')) {
        weight = raw.parse().map_err(|_| invalid("weight must be an integer percentage"))?;
        tokens.next();
    }

    let address = tokens.next().ok_or_else(|| invalid("missing destination address"))?;
    let (host, port) = split_host_port(address);
    let subset = tokens.next().unwrap_or_default().to_string();

    Ok(HttpRouteDestination {
        destination: Destination { host: host.to_string(), subset, port: port.map(PortSelector::new) },
        weight,
        ..Default::default()
    })
}

fn split_host_port(address: &str) -> (&str, Option<u32>) {
    if let Some((host, port)) = address.rsplit_once(':') {
        if let Ok(port) = port.parse::<u32>() {
            if (1..=65535).contains(&port) {
                return (host, Some(port));
            }
        }
    }
    (address, None)
}
