//! Redirects: temporal/permanent URL redirects, HTTPS upgrade and app root.

use super::{
    Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler,
    VirtualServiceHandler,
};
use crate::errors::AnnotationError;
use crate::mesh::{HttpMatchRequest, HttpRedirect, HttpRoute, StringMatch, VirtualService};
use http::StatusCode;
use serde::Serialize;
use tracing::{error, warn};
use url::Url;

const APP_ROOT: &str = "app-root";
const TEMPORAL_REDIRECT: &str = "temporal-redirect";
const PERMANENT_REDIRECT: &str = "permanent-redirect";
const PERMANENT_REDIRECT_CODE: &str = "permanent-redirect-code";
const SSL_REDIRECT: &str = "ssl-redirect";
const FORCE_SSL_REDIRECT: &str = "force-ssl-redirect";

const DEFAULT_PERMANENT_REDIRECT_CODE: u32 = 301;
const DEFAULT_TEMPORAL_REDIRECT_CODE: u32 = 302;
const SSL_REDIRECT_CODE: u32 = 308;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectConfig {
    pub app_root: String,
    pub url: String,
    pub code: u32,
    pub https_redirect: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            app_root: String::new(),
            url: String::new(),
            code: DEFAULT_PERMANENT_REDIRECT_CODE,
            https_redirect: false,
        }
    }
}

pub struct Redirect;

impl Parser for Redirect {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !need_redirect_config(annotations) {
            return Ok(Parsed::Absent);
        }

        let mut redirect = RedirectConfig {
            app_root: annotations.parse_string_asap(APP_ROOT).unwrap_or_default(),
            https_redirect: annotations.parse_bool_asap(SSL_REDIRECT).unwrap_or(false)
                || annotations.parse_bool_asap(FORCE_SSL_REDIRECT).unwrap_or(false),
            ..Default::default()
        };

        // A valid temporal redirect wins over every permanent setting.
        if let Some(url) = redirect_url(annotations, TEMPORAL_REDIRECT) {
            redirect.url = url;
            redirect.code = DEFAULT_TEMPORAL_REDIRECT_CODE;
            config.redirect = Some(redirect);
            return Ok(Parsed::Applied);
        }

        if let Some(url) = redirect_url(annotations, PERMANENT_REDIRECT) {
            redirect.url = url;
        }
        match annotations.parse_uint32_asap(PERMANENT_REDIRECT_CODE) {
            Ok(code) if is_redirect_code(code) => redirect.code = code,
            Ok(code) => warn!(code, "redirect code out of range, using 301"),
            Err(err) if !err.is_missing() => error!(error = %err, "invalid redirect code, using 301"),
            Err(_) => {}
        }

        config.redirect = Some(redirect);
        Ok(Parsed::Applied)
    }
}

/// Codes that send the client elsewhere: 301, 302, 303, 307 and 308
fn is_redirect_code(code: u32) -> bool {
    u16::try_from(code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .is_some_and(|status| {
            matches!(
                status,
                StatusCode::MOVED_PERMANENTLY
                    | StatusCode::FOUND
                    | StatusCode::SEE_OTHER
                    | StatusCode::TEMPORARY_REDIRECT
                    | StatusCode::PERMANENT_REDIRECT
            )
        })
}

impl RouteHandler for Redirect {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(redirect) = &config.redirect else {
            return;
        };

        let policy = if !redirect.url.is_empty() {
            let Ok(url) = Url::parse(&redirect.url) else {
                return;
            };
            HttpRedirect {
                uri: url.path().to_string(),
                authority: url.host_str().unwrap_or_default().to_string(),
                port: url.port().map(u32::from),
                scheme: url.scheme().to_string(),
                redirect_code: redirect.code,
            }
        } else if redirect.https_redirect {
            HttpRedirect {
                scheme: "https".to_string(),
                redirect_code: SSL_REDIRECT_CODE,
                ..Default::default()
            }
        } else {
            return;
        };

        // A redirect route never forwards upstream.
        route.route.clear();
        route.redirect = Some(policy);
    }
}

impl VirtualServiceHandler for Redirect {
    fn apply_virtual_service(&self, virtual_service: &mut VirtualService, config: &Ingress) {
        let Some(redirect) = config.redirect.as_ref().filter(|r| !r.app_root.is_empty()) else {
            return;
        };

        let name = format!("{}-{}-app-root", config.meta.namespace, config.meta.name);
        if virtual_service.http.iter().any(|route| route.name == name) {
            return;
        }

        let root = HttpRoute {
            name,
            r#match: vec![HttpMatchRequest {
                uri: Some(StringMatch::exact("/")),
                ..Default::default()
            }],
            redirect: Some(HttpRedirect {
                uri: redirect.app_root.clone(),
                redirect_code: DEFAULT_TEMPORAL_REDIRECT_CODE,
                ..Default::default()
            }),
            ..Default::default()
        };
        virtual_service.http.insert(0, root);
    }
}

/// Valid http(s) URL under `key`, logging malformed values
fn redirect_url(annotations: &Annotations, key: &str) -> Option<String> {
    let raw = annotations.parse_string_asap(key).ok()?;
    match validate_url(key, &raw) {
        Ok(()) => Some(raw),
        Err(err) => {
            error!(error = %err, "ignoring redirect");
            None
        }
    }
}

fn validate_url(key: &str, raw: &str) -> Result<(), AnnotationError> {
    let url = Url::parse(raw).map_err(|e| AnnotationError::invalid_value(key, raw, e.to_string()))?;
    if !url.scheme().starts_with("http") {
        return Err(AnnotationError::invalid_value(key, raw, "only http and https are valid"));
    }
    Ok(())
}

fn need_redirect_config(annotations: &Annotations) -> bool {
    [APP_ROOT, TEMPORAL_REDIRECT, PERMANENT_REDIRECT, SSL_REDIRECT, FORCE_SSL_REDIRECT]
        .iter()
        .any(|key| annotations.has_asap(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;
    use crate::mesh::{Destination, HttpRouteDestination};

    fn parse(pairs: &[(String, &str)]) -> Option<RedirectConfig> {
        let mut config = ingress("default", "web");
        let _ = Redirect.parse(&annotations(pairs), &mut config, &mut GlobalContext::default());
        config.redirect
    }

    #[test]
    fn temporal_redirect_is_checked_first() {
        let redirect = parse(&[
            (nginx(TEMPORAL_REDIRECT), "http://www.example.com/tmp"),
            (nginx(PERMANENT_REDIRECT), "http://www.example.com/perm"),
            (nginx(PERMANENT_REDIRECT_CODE), "308"),
        ])
        .expect("redirect");
        assert_eq!(redirect.url, "http://www.example.com/tmp");
        assert_eq!(redirect.code, 302);
    }

    #[test]
    fn permanent_redirect_honours_code_range() {
        let redirect = parse(&[
            (nginx(PERMANENT_REDIRECT), "https://www.example.com/perm"),
            (nginx(PERMANENT_REDIRECT_CODE), "307"),
        ])
        .expect("redirect");
        assert_eq!(redirect.code, 307);

        let redirect = parse(&[
            (nginx(PERMANENT_REDIRECT), "https://www.example.com/perm"),
            (nginx(PERMANENT_REDIRECT_CODE), "200"),
        ])
        .expect("redirect");
        assert_eq!(redirect.code, 301);
    }

    #[test]
    fn non_forwarding_3xx_codes_fall_back_to_301() {
        for code in ["300", "304", "305", "306"] {
            let redirect = parse(&[
                (nginx(PERMANENT_REDIRECT), "https://www.example.com/perm"),
                (nginx(PERMANENT_REDIRECT_CODE), code),
            ])
            .expect("redirect");
            assert_eq!(redirect.code, 301, "{code}");
        }
        for code in [301, 302, 303, 307, 308] {
            assert!(is_redirect_code(code), "{code}");
        }
    }

    #[test]
    fn invalid_urls_are_dropped() {
        let redirect = parse(&[(nginx(TEMPORAL_REDIRECT), "ftp://files.example.com")]).expect("redirect");
        assert!(redirect.url.is_empty());
        assert_eq!(redirect.code, 301);
    }

    #[test]
    fn ssl_redirect_sets_https_upgrade() {
        let redirect = parse(&[(native(FORCE_SSL_REDIRECT), "true")]).expect("redirect");
        assert!(redirect.https_redirect);

        let mut config = ingress("default", "web");
        config.redirect = Some(redirect);
        let mut route = HttpRoute {
            route: vec![HttpRouteDestination { destination: Destination::new("web", None), ..Default::default() }],
            ..Default::default()
        };
        Redirect.apply_route(&mut route, &config);
        assert_eq!(
            route.redirect,
            Some(HttpRedirect { scheme: "https".into(), redirect_code: 308, ..Default::default() })
        );
        assert!(route.route.is_empty());
    }

    #[test]
    fn url_redirect_splits_components() {
        let mut config = ingress("default", "web");
        config.redirect = Some(RedirectConfig {
            url: "https://www.example.com:8443/new/path".into(),
            code: 302,
            ..Default::default()
        });
        let mut route = HttpRoute::default();
        Redirect.apply_route(&mut route, &config);
        assert_eq!(
            route.redirect,
            Some(HttpRedirect {
                uri: "/new/path".into(),
                authority: "www.example.com".into(),
                port: Some(8443),
                scheme: "https".into(),
                redirect_code: 302,
            })
        );
    }

    #[test]
    fn app_root_prepends_root_redirect_once() {
        let mut config = ingress("default", "web");
        config.redirect = parse(&[(nginx(APP_ROOT), "/app")]);
        let mut vs = VirtualService { http: vec![HttpRoute { name: "existing".into(), ..Default::default() }], ..Default::default() };

        Redirect.apply_virtual_service(&mut vs, &config);
        Redirect.apply_virtual_service(&mut vs, &config);

        assert_eq!(vs.http.len(), 2);
        let root = &vs.http[0];
        assert_eq!(root.name, "default-web-app-root");
        assert_eq!(root.first_uri(), Some(&StringMatch::exact("/")));
        assert_eq!(root.redirect.as_ref().map(|r| (r.uri.as_str(), r.redirect_code)), Some(("/app", 302)));
    }

    #[test]
    fn app_root_only_does_not_touch_routes() {
        let mut config = ingress("default", "web");
        config.redirect = parse(&[(nginx(APP_ROOT), "/app")]);
        let mut route = HttpRoute::default();
        Redirect.apply_route(&mut route, &config);
        assert!(route.redirect.is_none());
    }
}
