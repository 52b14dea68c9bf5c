//! Cross-origin resource sharing.

use super::util::split_string_with_space_trim;
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::mesh::{CorsPolicy, HttpRoute, StringMatch};
use serde::Serialize;
use std::time::Duration;
use tracing::error;

const ENABLE_CORS: &str = "enable-cors";
const ALLOW_ORIGIN: &str = "cors-allow-origin";
const ALLOW_METHODS: &str = "cors-allow-methods";
const ALLOW_HEADERS: &str = "cors-allow-headers";
const EXPOSE_HEADERS: &str = "cors-expose-headers";
const ALLOW_CREDENTIALS: &str = "cors-allow-credentials";
const MAX_AGE: &str = "cors-max-age";

const DEFAULT_ALLOW_ORIGIN: &str = "*";
const DEFAULT_ALLOW_METHODS: &str = "GET, PUT, POST, DELETE, PATCH, OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "DNT,X-CustomHeader,Keep-Alive,User-Agent,X-Requested-With,If-Modified-Since,Cache-Control,Content-Type,Authorization";
const DEFAULT_ALLOW_CREDENTIALS: bool = true;
const DEFAULT_MAX_AGE: i64 = 1_728_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origin: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: i64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origin: vec![DEFAULT_ALLOW_ORIGIN.to_string()],
            allow_methods: split_string_with_space_trim(DEFAULT_ALLOW_METHODS),
            allow_headers: split_string_with_space_trim(DEFAULT_ALLOW_HEADERS),
            expose_headers: Vec::new(),
            allow_credentials: DEFAULT_ALLOW_CREDENTIALS,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

pub struct Cors;

impl Parser for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        match annotations.parse_bool_asap(ENABLE_CORS) {
            Ok(true) => {}
            Ok(false) => return Ok(Parsed::Absent),
            Err(err) if err.is_missing() => return Ok(Parsed::Absent),
            Err(err) => return Err(err),
        }

        let mut cors = CorsConfig { enabled: true, ..Default::default() };

        if let Ok(origin) = annotations.parse_string_asap(ALLOW_ORIGIN) {
            cors.allow_origin = split_string_with_space_trim(&origin);
        }
        if let Ok(methods) = annotations.parse_string_asap(ALLOW_METHODS) {
            cors.allow_methods = split_string_with_space_trim(&methods);
        }
        if let Ok(headers) = annotations.parse_string_asap(ALLOW_HEADERS) {
            cors.allow_headers = split_string_with_space_trim(&headers);
        }
        if let Ok(headers) = annotations.parse_string_asap(EXPOSE_HEADERS) {
            cors.expose_headers = split_string_with_space_trim(&headers);
        }
        match annotations.parse_bool_asap(ALLOW_CREDENTIALS) {
            Ok(allow) => cors.allow_credentials = allow,
            Err(err) if !err.is_missing() => error!(error = %err, "keeping default CORS credentials"),
            Err(_) => {}
        }
        match annotations.parse_int_asap(MAX_AGE) {
            Ok(age) => cors.max_age = age,
            Err(err) if !err.is_missing() => error!(error = %err, "keeping default CORS max age"),
            Err(_) => {}
        }

        config.cors = Some(cors);
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for Cors {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(cors) = config.cors.as_ref().filter(|c| c.enabled) else {
            return;
        };

        let mut allow_origins = Vec::new();
        for origin in &cors.allow_origin {
            if origin == "*" {
                allow_origins = vec![StringMatch::regex(".*")];
                break;
            }
            allow_origins.push(compile_origin(origin));
        }

        route.cors_policy = Some(CorsPolicy {
            allow_origins,
            allow_methods: cors.allow_methods.clone(),
            allow_headers: cors.allow_headers.clone(),
            expose_headers: cors.expose_headers.clone(),
            max_age: u64::try_from(cors.max_age).ok().map(Duration::from_secs),
            allow_credentials: Some(cors.allow_credentials),
        });
    }
}

/// Wildcard hosts become an anchored regex on the literal remainder; the scheme
/// is dropped and the port kept. Everything else is an exact match.
fn compile_origin(origin: &str) -> StringMatch {
    let without_scheme = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let (host, port) = match without_scheme.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (host, Some(port))
        }
        _ => (without_scheme, None),
    };

    if !host.contains('*') {
        return StringMatch::exact(origin);
    }

    let remainder = host.trim_start_matches('*');
    let mut pattern = format!(".*{}", regex::escape(remainder));
    if let Some(port) = port {
        pattern.push(':');
        pattern.push_str(port);
    }
    StringMatch::regex(pattern)
}
