//! # Ingress Annotations
//!
//! Translation of ingress annotations into mesh configuration. Each feature
//! lives in its own module and implements [`Parser`] plus whichever handler
//! traits match the target objects it affects. [`AnnotationHandlerManager`]
//! holds the ordered lists and is the single entry point per ingress.
//!
//! ```rust,ignore
//! let manager = AnnotationHandlerManager::new();
//! let mut config = Ingress::new(Meta::from_annotations("default", "web", &annotations, "c1"));
//! let report = manager.parse(&annotations, &mut config, &mut ctx);
//! manager.apply_route(&mut route, &config);
//! ```

pub mod accessor;
pub mod manager;
pub mod model;
pub mod util;

pub mod auth;
pub mod authz;
pub mod canary;
pub mod cors;
pub mod destination;
pub mod downstream_tls;
pub mod fallback;
pub mod header_control;
pub mod http2rpc;
pub mod ignore_case;
pub mod ip_access_control;
pub mod load_balance;
pub mod local_rate_limit;
pub mod mcp_server;
pub mod mirror;
pub mod redirect;
pub mod retry;
pub mod rewrite;
pub mod route_match;
pub mod timeout;
pub mod upstream_tls;

pub use accessor::{Annotations, NATIVE_PREFIX, NGINX_PREFIX};
pub use manager::{AnnotationHandlerManager, FeatureOutcome, Outcome, ParseReport};
pub use model::{GlobalContext, Ingress, Meta};

use crate::errors::AnnotationError;
use crate::mesh::{Gateway, HttpRoute, TrafficPolicy, VirtualService};

/// Successful parser outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    /// The feature was requested and its model field is populated
    Applied,
    /// The presence predicate was false; the model field stays `None`
    Absent,
}

pub type ParseResult = Result<Parsed, AnnotationError>;

/// Reads annotations and fills one model field.
///
/// An `Err` means the feature was requested but could not be resolved; the
/// parser leaves its field `None` (or a safe partial config) and the manager
/// records the failure without stopping sibling parsers.
pub trait Parser: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(
        &self,
        annotations: &Annotations,
        config: &mut Ingress,
        ctx: &mut GlobalContext,
    ) -> ParseResult;
}

pub trait GatewayHandler: Send + Sync {
    fn apply_gateway(&self, gateway: &mut Gateway, config: &Ingress);
}

pub trait VirtualServiceHandler: Send + Sync {
    fn apply_virtual_service(&self, virtual_service: &mut VirtualService, config: &Ingress);
}

pub trait RouteHandler: Send + Sync {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress);
}

pub trait TrafficPolicyHandler: Send + Sync {
    fn apply_traffic_policy(&self, policy: &mut TrafficPolicy, config: &Ingress);
}
