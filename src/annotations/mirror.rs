//! Shadow traffic to a second service.
//!
//! The target is `namespace/name[:port]` (bare names take the ingress
//! namespace). Without a port the first service port is used.

use super::util::{service_host, NamespacedName};
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::errors::AnnotationError;
use crate::kube::service_ports;
use crate::mesh::{Destination, HttpRoute, Percent};
use serde::Serialize;
use tracing::error;

const MIRROR_TARGET_SERVICE: &str = "mirror-target-service";
const MIRROR_PERCENTAGE: &str = "mirror-percentage";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    pub service: NamespacedName,
    pub host: String,
    pub port: u32,
    /// Unset means every request is mirrored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

pub struct Mirror;

impl Parser for Mirror {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, ctx: &mut GlobalContext) -> ParseResult {
        if !annotations.has_native(MIRROR_TARGET_SERVICE) {
            return Ok(Parsed::Absent);
        }

        let raw = annotations.parse_string_native(MIRROR_TARGET_SERVICE)?;
        let (target, port) = split_port(&raw)?;
        let service_name = NamespacedName::parse(MIRROR_TARGET_SERVICE, target, &config.meta.namespace)?;
        let service = ctx.service(&config.meta.cluster_id, &service_name.namespace, &service_name.name)?;
        let port = match port {
            Some(port) => port,
            None => service_ports(&service).first().copied().ok_or_else(|| {
                AnnotationError::invalid_value(MIRROR_TARGET_SERVICE, raw.clone(), "service declares no ports")
            })?,
        };

        let percentage = match annotations.parse_int32_native(MIRROR_PERCENTAGE) {
            Ok(value) if value < 100 => Some(f64::from(value.max(0))),
            Ok(_) => None,
            Err(err) if !err.is_missing() => {
                error!(error = %err, "ignoring mirror percentage, mirroring all requests");
                None
            }
            Err(_) => None,
        };

        config.mirror = Some(MirrorConfig {
            host: service_host(&service_name.name, &service_name.namespace, &ctx.domain_suffix),
            service: service_name,
            port,
            percentage,
        });
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for Mirror {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(mirror) = &config.mirror else {
            return;
        };
        route.mirror = Some(Destination::new(mirror.host.clone(), Some(mirror.port)));
        route.mirror_percentage = mirror.percentage.map(|value| Percent { value });
    }
}

fn split_port(raw: &str) -> Result<(&str, Option<u32>), AnnotationError> {
    let Some((target, port)) = raw.rsplit_once(':') else {
        return Ok((raw, None));
    };
    match port.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok((target, Some(port))),
        _ => Err(AnnotationError::invalid_value(MIRROR_TARGET_SERVICE, raw, "port must be in 1..=65535")),
    }
}
