//! Default backend used when the primary upstream answers with selected
//! status codes.
//!
//! The route handler installs an internal active redirect that re-dispatches
//! the request with two marker headers. [`fallback_route`] builds the companion
//! route that matches those headers and forwards to the default backend.

use super::util::{service_host, NamespacedName};
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::errors::AnnotationError;
use crate::kube::service_ports;
use crate::mesh::{
    Destination, HeaderOperations, Headers, HttpInternalActiveRedirect, HttpRoute,
    HttpRouteDestination, StringMatch,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;

const DEFAULT_BACKEND: &str = "default-backend";
const CUSTOM_HTTP_ERRORS: &str = "custom-http-errors";

pub const FALLBACK_ROUTE_SUFFIX: &str = "-fallback";
pub const FALLBACK_FROM_HEADER: &str = "x-higress-fallback-from";
pub const FALLBACK_TO_HEADER: &str = "x-higress-fallback-to";
const DEFAULT_REDIRECT_URL: &str = "http://example.com/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackConfig {
    pub default_backend: NamespacedName,
    /// In-mesh FQDN of the default backend
    pub host: String,
    pub port: u32,
    pub custom_http_errors: Vec<u32>,
}

pub struct Fallback;

impl Parser for Fallback {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, ctx: &mut GlobalContext) -> ParseResult {
        if !annotations.has_asap(DEFAULT_BACKEND) {
            return Ok(Parsed::Absent);
        }

        let raw = annotations.parse_string_asap(DEFAULT_BACKEND)?;
        let backend = NamespacedName::parse(DEFAULT_BACKEND, &raw, &config.meta.namespace)?;
        let service = ctx.service(&config.meta.cluster_id, &backend.namespace, &backend.name)?;
        let port = service_ports(&service)
            .first()
            .copied()
            .ok_or_else(|| AnnotationError::invalid_value(DEFAULT_BACKEND, raw.clone(), "service declares no ports"))?;

        let custom_http_errors = annotations
            .parse_string_asap(CUSTOM_HTTP_ERRORS)
            .map(|codes| parse_status_codes(&codes))
            .unwrap_or_default();

        config.fallback = Some(FallbackConfig {
            host: service_host(&backend.name, &backend.namespace, &ctx.domain_suffix),
            default_backend: backend,
            port,
            custom_http_errors,
        });
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for Fallback {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(fallback) = config.fallback.as_ref().filter(|f| !f.custom_http_errors.is_empty()) else {
            return;
        };
        // Redirect routes never reach an upstream, so there is nothing to fall back from.
        if route.redirect.is_some() {
            return;
        }

        let add = BTreeMap::from([
            (FALLBACK_FROM_HEADER.to_string(), format!("{}{FALLBACK_ROUTE_SUFFIX}", route.name)),
            (FALLBACK_TO_HEADER.to_string(), fallback.host.clone()),
        ]);
        route.internal_active_redirect = Some(HttpInternalActiveRedirect {
            max_internal_redirects: 1,
            redirect_response_codes: fallback.custom_http_errors.clone(),
            allow_cross_scheme_redirect: true,
            headers: Some(Headers {
                request: Some(HeaderOperations { add, ..Default::default() }),
                response: None,
            }),
            redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            forced_use_original_host: true,
            forced_add_header_before_route_matcher: true,
        });
    }
}

/// Companion route receiving requests re-dispatched from `route`. `None` when
/// the ingress has no fallback with status codes.
pub fn fallback_route(route: &HttpRoute, config: &Ingress) -> Option<HttpRoute> {
    let fallback = config.fallback.as_ref().filter(|f| !f.custom_http_errors.is_empty())?;

    let mut companion = route.clone();
    companion.name = format!("{}{FALLBACK_ROUTE_SUFFIX}", route.name);
    companion.internal_active_redirect = None;
    companion.redirect = None;
    companion.route = vec![HttpRouteDestination {
        destination: Destination::new(fallback.host.clone(), Some(fallback.port)),
        weight: 100,
        ..Default::default()
    }];
    for matcher in &mut companion.r#match {
        matcher
            .headers
            .insert(FALLBACK_FROM_HEADER.to_string(), StringMatch::exact(companion.name.clone()));
    }
    Some(companion)
}

fn parse_status_codes(raw: &str) -> Vec<u32> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .filter_map(|code| match code.parse::<u32>() {
            Ok(code) => Some(code),
            Err(err) => {
                error!(code, error = %err, "ignoring custom http error code");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;
    use crate::kube::{fixtures, InMemoryLister};
    use crate::mesh::{HttpMatchRequest, HttpRedirect};
    use std::sync::Arc;

    fn context() -> GlobalContext {
        let lister = InMemoryLister::new([
            fixtures::service("default", "fallback", &[8080, 80]),
            fixtures::service("other", "portless", &[]),
        ]);
        GlobalContext::default().with_service_lister("", Arc::new(lister))
    }

    fn parse(pairs: &[(String, &str)]) -> (ParseResult, Option<FallbackConfig>) {
        let mut config = ingress("default", "web");
        let result = Fallback.parse(&annotations(pairs), &mut config, &mut context());
        (result, config.fallback)
    }

    #[test]
    fn resolves_first_service_port() {
        let (result, fallback) = parse(&[
            (nginx(DEFAULT_BACKEND), "fallback"),
            (nginx(CUSTOM_HTTP_ERRORS), "404, 503,abc"),
        ]);
        assert_eq!(result.expect("parse"), Parsed::Applied);
        assert_eq!(
            fallback,
            Some(FallbackConfig {
                default_backend: NamespacedName::new("default", "fallback"),
                host: "fallback.default.svc.cluster.local".into(),
                port: 8080,
                custom_http_errors: vec![404, 503],
            })
        );
    }

    #[test]
    fn missing_service_or_ports_leave_field_unset() {
        let (result, fallback) = parse(&[(nginx(DEFAULT_BACKEND), "default/nope")]);
        assert!(matches!(result, Err(AnnotationError::MissingReference { .. })));
        assert!(fallback.is_none());

        let (result, fallback) = parse(&[(nginx(DEFAULT_BACKEND), "other/portless")]);
        assert!(matches!(result, Err(AnnotationError::InvalidValue { .. })));
        assert!(fallback.is_none());
    }

    fn configured() -> Ingress {
        let mut config = ingress("default", "web");
        config.fallback = Some(FallbackConfig {
            default_backend: NamespacedName::new("default", "fallback"),
            host: "fallback.default.svc.cluster.local".into(),
            port: 8080,
            custom_http_errors: vec![404],
        });
        config
    }

    fn route() -> HttpRoute {
        HttpRoute {
            name: "default-web".into(),
            r#match: vec![HttpMatchRequest { uri: Some(StringMatch::prefix("/")), ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn installs_internal_redirect_with_marker_headers() {
        let mut route = route();
        Fallback.apply_route(&mut route, &configured());

        let redirect = route.internal_active_redirect.expect("redirect");
        assert_eq!(redirect.max_internal_redirects, 1);
        assert_eq!(redirect.redirect_response_codes, vec![404]);
        assert_eq!(redirect.redirect_url, "http://example.com/");
        let add = redirect.headers.and_then(|h| h.request).expect("request headers").add;
        assert_eq!(add[FALLBACK_FROM_HEADER], "default-web-fallback");
        assert_eq!(add[FALLBACK_TO_HEADER], "fallback.default.svc.cluster.local");
    }

    #[test]
    fn redirect_wins_over_fallback() {
        let mut route = route();
        route.redirect = Some(HttpRedirect { scheme: "https".into(), redirect_code: 308, ..Default::default() });
        Fallback.apply_route(&mut route, &configured());
        assert!(route.internal_active_redirect.is_none());
    }

    #[test]
    fn companion_route_matches_marker_header() {
        let companion = fallback_route(&route(), &configured()).expect("companion");
        assert_eq!(companion.name, "default-web-fallback");
        assert_eq!(companion.route[0].destination, Destination::new("fallback.default.svc.cluster.local", Some(8080)));
        assert_eq!(
            companion.r#match[0].headers[FALLBACK_FROM_HEADER],
            StringMatch::exact("default-web-fallback")
        );

        let mut without_codes = configured();
        if let Some(f) = without_codes.fallback.as_mut() {
            f.custom_http_errors.clear();
        }
        assert!(fallback_route(&route(), &without_codes).is_none());
    }
}
