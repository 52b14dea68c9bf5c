//! Ordered registry of parsers and handlers.
//!
//! The manager runs every parser once per ingress, in registration order, and
//! never lets one failing feature stop its siblings. Handler lists are applied
//! in order per target type.

use super::{
    auth::Auth, authz::Authz, canary::Canary, cors::Cors, destination::DestinationOverride,
    downstream_tls::DownstreamTls, fallback::Fallback, header_control::HeaderControl,
    http2rpc::Http2Rpc, ignore_case::IgnoreCase, ip_access_control::IpAccessControl,
    load_balance::LoadBalance, local_rate_limit::LocalRateLimit, mcp_server::McpServerRegistration,
    mirror::Mirror, redirect::Redirect, retry::Retry, rewrite::Rewrite, route_match::RouteMatch,
    timeout::Timeout, upstream_tls::UpstreamTls,
};
use super::{
    Annotations, GatewayHandler, GlobalContext, Ingress, Parsed, Parser, RouteHandler,
    TrafficPolicyHandler, VirtualServiceHandler,
};
use crate::errors::AnnotationError;
use crate::mesh::{Gateway, HttpRoute, TrafficPolicy, VirtualService};
use crate::{ingress_span, phase_span};
use serde::Serialize;
use tracing::{debug, error, warn};

/// What happened to one feature during the parse phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum Outcome {
    Applied,
    Absent,
    /// Requested but unusable; the model field was left unset or partial
    #[serde(serialize_with = "display")]
    Skipped(AnnotationError),
}

fn display<S: serde::Serializer>(err: &AnnotationError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureOutcome {
    pub feature: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Per-feature outcomes of one parse pass, in parser order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub features: Vec<FeatureOutcome>,
}

impl ParseReport {
    pub fn applied(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.features.iter().filter(|f| f.outcome == Outcome::Applied).map(|f| f.feature)
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&'static str, &AnnotationError)> + '_ {
        self.features.iter().filter_map(|f| match &f.outcome {
            Outcome::Skipped(err) => Some((f.feature, err)),
            _ => None,
        })
    }

    pub fn outcome(&self, feature: &str) -> Option<&Outcome> {
        self.features.iter().find(|f| f.feature == feature).map(|f| &f.outcome)
    }
}

pub struct AnnotationHandlerManager {
    parsers: Vec<Box<dyn Parser>>,
    gateway_handlers: Vec<Box<dyn GatewayHandler>>,
    virtual_service_handlers: Vec<Box<dyn VirtualServiceHandler>>,
    route_handlers: Vec<Box<dyn RouteHandler>>,
    traffic_policy_handlers: Vec<Box<dyn TrafficPolicyHandler>>,
}

impl Default for AnnotationHandlerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationHandlerManager {
    pub fn new() -> Self {
        Self {
            parsers: vec![
                Box::new(Canary),
                Box::new(Cors),
                Box::new(DownstreamTls),
                Box::new(Redirect),
                Box::new(Rewrite),
                Box::new(UpstreamTls),
                Box::new(IpAccessControl),
                Box::new(Timeout),
                Box::new(Retry),
                Box::new(LoadBalance),
                Box::new(LocalRateLimit),
                Box::new(Fallback),
                Box::new(Auth),
                Box::new(DestinationOverride),
                Box::new(IgnoreCase),
                Box::new(RouteMatch),
                Box::new(HeaderControl),
                Box::new(Http2Rpc),
                Box::new(Mirror),
                Box::new(Authz),
                Box::new(McpServerRegistration),
            ],
            gateway_handlers: vec![Box::new(DownstreamTls)],
            virtual_service_handlers: vec![Box::new(IpAccessControl), Box::new(Redirect)],
            route_handlers: vec![
                Box::new(Cors),
                Box::new(Redirect),
                Box::new(Rewrite),
                Box::new(IpAccessControl),
                Box::new(Timeout),
                Box::new(Retry),
                Box::new(LocalRateLimit),
                Box::new(Fallback),
                Box::new(IgnoreCase),
                Box::new(RouteMatch),
                Box::new(HeaderControl),
                Box::new(Mirror),
                Box::new(DestinationOverride),
            ],
            traffic_policy_handlers: vec![Box::new(UpstreamTls), Box::new(LoadBalance)],
        }
    }

    /// Registered parser names in execution order
    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Run every parser against `annotations`, filling `config`.
    ///
    /// Failures are logged with the ingress identity and recorded in the
    /// report; they never abort the pass.
    pub fn parse(&self, annotations: &Annotations, config: &mut Ingress, ctx: &mut GlobalContext) -> ParseReport {
        let span = ingress_span!(config.meta.namespace, config.meta.name, cluster = %config.meta.cluster_id);
        let _guard = span.enter();

        let mut report = ParseReport::default();
        for parser in &self.parsers {
            let outcome = match parser.parse(annotations, config, ctx) {
                Ok(Parsed::Applied) => {
                    debug!(feature = parser.name(), "annotation feature applied");
                    Outcome::Applied
                }
                Ok(Parsed::Absent) => Outcome::Absent,
                Err(err) => {
                    if matches!(err, AnnotationError::Unsupported { .. }) {
                        warn!(feature = parser.name(), error = %err, "skipping unsupported annotation feature");
                    } else {
                        error!(feature = parser.name(), error = %err, "skipping annotation feature");
                    }
                    Outcome::Skipped(err)
                }
            };
            report.features.push(FeatureOutcome { feature: parser.name(), outcome });
        }
        report
    }

    pub fn apply_gateway(&self, gateway: &mut Gateway, config: &Ingress) {
        let _guard = phase_span!("gateway", ingress = %config.meta.key()).entered();
        for handler in &self.gateway_handlers {
            handler.apply_gateway(gateway, config);
        }
    }

    pub fn apply_virtual_service(&self, virtual_service: &mut VirtualService, config: &Ingress) {
        let _guard = phase_span!("virtual_service", ingress = %config.meta.key()).entered();
        for handler in &self.virtual_service_handlers {
            handler.apply_virtual_service(virtual_service, config);
        }
    }

    pub fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let _guard = phase_span!("route", ingress = %config.meta.key(), route = %route.name).entered();
        for handler in &self.route_handlers {
            handler.apply_route(route, config);
        }
    }

    pub fn apply_traffic_policy(&self, policy: &mut TrafficPolicy, config: &Ingress) {
        let _guard = phase_span!("traffic_policy", ingress = %config.meta.key()).entered();
        for handler in &self.traffic_policy_handlers {
            handler.apply_traffic_policy(policy, config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;
    use crate::mesh::{HttpMatchRequest, StringMatch};
    use std::time::Duration;

    #[test]
    fn parsers_run_in_registration_order() {
        let manager = AnnotationHandlerManager::new();
        let names = manager.parser_names();
        assert_eq!(names.len(), 21);
        assert_eq!(names.first(), Some(&"canary"));
        assert_eq!(names.last(), Some(&"mcp-server"));
        let report = manager.parse(&Annotations::new(), &mut ingress("default", "web"), &mut GlobalContext::default());
        assert_eq!(report.features.iter().map(|f| f.feature).collect::<Vec<_>>(), names);
        assert!(report.features.iter().all(|f| f.outcome == Outcome::Absent));
    }

    #[test]
    fn empty_annotations_leave_model_empty() {
        let manager = AnnotationHandlerManager::new();
        let mut config = ingress("default", "web");
        let mut ctx = GlobalContext::default();
        manager.parse(&Annotations::new(), &mut config, &mut ctx);
        assert_eq!(config, ingress("default", "web"));
        assert!(ctx.watched_secrets.is_empty());
        assert!(ctx.mcp_servers.is_empty());
    }

    #[test]
    fn failing_feature_does_not_stop_siblings() {
        let manager = AnnotationHandlerManager::new();
        let mut config = ingress("default", "web");
        let a = annotations(&[
            (nginx("auth-type"), "digest"),
            (nginx("auth-secret"), "users"),
            (native("timeout"), "abc"),
            (native("ignore-path-case"), "true"),
        ]);
        let report = manager.parse(&a, &mut config, &mut GlobalContext::default());

        assert!(matches!(report.outcome("auth"), Some(Outcome::Skipped(AnnotationError::Unsupported { .. }))));
        assert!(matches!(report.outcome("timeout"), Some(Outcome::Skipped(AnnotationError::InvalidValue { .. }))));
        assert_eq!(report.outcome("ignore-case"), Some(&Outcome::Applied));
        assert_eq!(report.applied().collect::<Vec<_>>(), vec!["ignore-case"]);
        assert_eq!(report.skipped().count(), 2);
        assert!(config.auth.is_none());
        assert!(config.timeout.is_none());
    }

    #[test]
    fn route_handlers_compose() {
        let manager = AnnotationHandlerManager::new();
        let mut config = ingress("default", "web");
        let a = annotations(&[
            (nginx("enable-cors"), "true"),
            (native("timeout"), "5"),
            (native("ignore-path-case"), "true"),
        ]);
        manager.parse(&a, &mut config, &mut GlobalContext::default());

        let mut route = HttpRoute {
            name: "default-web".into(),
            r#match: vec![HttpMatchRequest { uri: Some(StringMatch::prefix("/")), ..Default::default() }],
            ..Default::default()
        };
        manager.apply_route(&mut route, &config);
        assert!(route.cors_policy.is_some());
        assert_eq!(route.timeout, Some(Duration::from_secs(5)));
        assert!(route.r#match[0].ignore_uri_case);
    }

    #[test]
    fn report_serializes_with_status() {
        let report = ParseReport {
            features: vec![
                FeatureOutcome { feature: "cors", outcome: Outcome::Applied },
                FeatureOutcome { feature: "auth", outcome: Outcome::Skipped(AnnotationError::missing("k")) },
            ],
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["features"][0]["status"], "applied");
        assert_eq!(json["features"][1]["status"], "skipped");
        assert_eq!(json["features"][1]["error"], "annotation k is missing");
    }
}
