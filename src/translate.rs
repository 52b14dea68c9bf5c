//! # Ingress Translation
//!
//! Projects Kubernetes `Ingress` objects onto mesh objects: one [`Gateway`],
//! one [`VirtualService`] per host and one [`TrafficPolicy`] per backend
//! port. Annotation features are applied through the
//! [`AnnotationHandlerManager`]; canary ingresses are merged into the routes
//! of the baseline ingress serving the same host and path.

use crate::annotations::canary::{apply_by_header, apply_by_weight, normalize_weights};
use crate::annotations::fallback::{fallback_route, FALLBACK_ROUTE_SUFFIX};
use crate::annotations::mcp_server::McpServer;
use crate::annotations::rewrite::RewriteConfig;
use crate::annotations::util::{credential_name, service_host};
use crate::annotations::{AnnotationHandlerManager, Annotations, GlobalContext, Ingress, Meta, ParseReport};
use crate::config::EngineConfig;
use crate::kube::service_port_by_name;
use crate::mesh::{
    Destination, Gateway, HttpMatchRequest, HttpRoute, HttpRouteDestination, Port, Server,
    ServerTlsSettings, StringMatch, TrafficPolicy, VirtualService,
};
use crate::xds::{typed_per_filter_config, TypedConfig};
use k8s_openapi::api::networking::v1::{HTTPIngressPath, Ingress as KubeIngress, IngressBackend};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

const WILDCARD_HOST: &str = "*";
const HTTP_PORT: u32 = 80;
const HTTPS_PORT: u32 = 443;
const GATEWAY_SELECTOR_KEY: &str = "higress";

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("ingress in namespace {namespace:?} has no name")]
    MissingName { namespace: String },
}

/// One ingress after the parse phase
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIngress {
    pub config: Ingress,
    pub report: ParseReport,
    #[serde(skip)]
    pub source: KubeIngress,
}

impl ParsedIngress {
    fn is_canary(&self) -> bool {
        self.config.canary.as_ref().is_some_and(|c| c.enabled)
    }
}

/// Everything produced for one set of ingresses
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub gateway: Gateway,
    pub virtual_services: Vec<VirtualService>,
    /// Keyed by `host:port` of the backend
    pub traffic_policies: BTreeMap<String, TrafficPolicy>,
    /// Envoy per-route filter configs keyed by route name, then filter name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub route_filters: BTreeMap<String, BTreeMap<String, TypedConfig>>,
    /// Envoy per-host filter configs keyed by host, then filter name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub host_filters: BTreeMap<String, BTreeMap<String, TypedConfig>>,
    pub reports: BTreeMap<String, ParseReport>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub watched_secrets: BTreeSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mcp_servers: Vec<McpServer>,
}

/// Routes of one host and the ingresses that contributed to them
struct HostRoutes {
    virtual_service: VirtualService,
    owners: Vec<usize>,
}

pub struct Translator {
    manager: AnnotationHandlerManager,
    engine: EngineConfig,
}

impl Translator {
    pub fn new(engine: EngineConfig) -> Self {
        Self { manager: AnnotationHandlerManager::new(), engine }
    }

    /// Fresh context carrying the configured domain suffix; listers are added by the caller
    pub fn context(&self) -> GlobalContext {
        GlobalContext::default().with_domain_suffix(self.engine.domain_suffix.clone())
    }

    /// Run the parse phase for one ingress
    pub fn parse(&self, ingress: &KubeIngress, ctx: &mut GlobalContext) -> Result<ParsedIngress, TranslateError> {
        let namespace = ingress.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = ingress
            .metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TranslateError::MissingName { namespace: namespace.clone() })?;
        let annotations: Annotations = ingress.metadata.annotations.clone().unwrap_or_default().into();

        let mut config = Ingress::new(Meta::from_annotations(namespace, name, &annotations, &self.engine.cluster_id));
        let report = self.manager.parse(&annotations, &mut config, ctx);
        Ok(ParsedIngress { config, report, source: ingress.clone() })
    }

    /// Parse and project every ingress.
    ///
    /// Baseline ingresses are processed first so canaries always find the
    /// route they attach to.
    pub fn translate(&self, ingresses: &[KubeIngress], ctx: &mut GlobalContext) -> Result<Translation, TranslateError> {
        let parsed = ingresses.iter().map(|i| self.parse(i, ctx)).collect::<Result<Vec<_>, _>>()?;

        let mut translation = Translation {
            gateway: Gateway {
                selector: BTreeMap::from([(
                    GATEWAY_SELECTOR_KEY.to_string(),
                    format!("{}-{}", self.engine.gateway_namespace, self.engine.gateway_name),
                )]),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut hosts: BTreeMap<String, HostRoutes> = BTreeMap::new();

        for (index, ingress) in parsed.iter().enumerate().filter(|(_, p)| !p.is_canary()) {
            self.add_https_servers(ingress, &mut translation.gateway);
            for (host, route) in self.routes(ingress, ctx) {
                self.add_traffic_policies(&route, &ingress.config, &mut translation.traffic_policies);
                let entry = hosts.entry(host.clone()).or_insert_with(|| HostRoutes {
                    virtual_service: VirtualService {
                        hosts: vec![host],
                        gateways: vec![self.engine.gateway_ref()],
                        ..Default::default()
                    },
                    owners: Vec::new(),
                });
                // The companion must win over the primary route for re-dispatched requests.
                if let Some(companion) = fallback_route(&route, &ingress.config) {
                    entry.virtual_service.http.push(companion);
                }
                entry.virtual_service.http.push(route);
                if !entry.owners.contains(&index) {
                    entry.owners.push(index);
                }
            }
        }

        for entry in hosts.values_mut() {
            entry.virtual_service.http.sort_by_key(route_rank);
        }

        self.merge_canaries(&parsed, &mut hosts, &mut translation.traffic_policies, ctx);

        for (host, mut entry) in hosts {
            for &owner in &entry.owners {
                self.manager.apply_virtual_service(&mut entry.virtual_service, &parsed[owner].config);
            }
            for route in &entry.virtual_service.http {
                let filters = typed_per_filter_config(&route.route_http_filters);
                if !filters.is_empty() {
                    translation.route_filters.insert(route.name.clone(), filters);
                }
            }
            let filters = typed_per_filter_config(&entry.virtual_service.host_http_filters);
            if !filters.is_empty() {
                translation.host_filters.insert(host, filters);
            }
            translation.virtual_services.push(entry.virtual_service);
        }

        let http_hosts: Vec<String> = translation.virtual_services.iter().flat_map(|vs| vs.hosts.clone()).collect();
        if !http_hosts.is_empty() {
            translation.gateway.servers.insert(
                0,
                Server {
                    name: format!("http-{HTTP_PORT}"),
                    port: Port { number: HTTP_PORT, protocol: "HTTP".to_string(), name: format!("http-{HTTP_PORT}") },
                    hosts: http_hosts,
                    tls: None,
                },
            );
        }

        translation.reports = parsed.iter().map(|p| (p.config.meta.key(), p.report.clone())).collect();
        translation.watched_secrets = ctx.watched_secrets.clone();
        translation.mcp_servers = ctx.mcp_servers.clone();

        info!(
            ingresses = parsed.len(),
            virtual_services = translation.virtual_services.len(),
            servers = translation.gateway.servers.len(),
            traffic_policies = translation.traffic_policies.len(),
            "translated ingresses"
        );
        Ok(translation)
    }

    fn merge_canaries(
        &self,
        parsed: &[ParsedIngress],
        hosts: &mut BTreeMap<String, HostRoutes>,
        policies: &mut BTreeMap<String, TrafficPolicy>,
        ctx: &GlobalContext,
    ) {
        let mut canary_routes: BTreeSet<String> = BTreeSet::new();
        let mut weight_totals: BTreeMap<(String, String), i32> = BTreeMap::new();

        for ingress in parsed.iter().filter(|p| p.is_canary()) {
            let Some(canary) = &ingress.config.canary else {
                continue;
            };
            for (host, mut route) in self.routes(ingress, ctx) {
                let Some(entry) = hosts.get_mut(&host) else {
                    warn!(ingress = %ingress.config.meta.key(), host = %host, "canary has no baseline host");
                    continue;
                };
                let Some(position) = entry.virtual_service.http.iter().position(|baseline| {
                    same_uris(baseline, &route)
                        && !baseline.name.ends_with(FALLBACK_ROUTE_SUFFIX)
                        && !canary_routes.contains(&baseline.name)
                }) else {
                    warn!(ingress = %ingress.config.meta.key(), route = %route.name, "canary has no baseline route");
                    continue;
                };

                self.add_traffic_policies(&route, &ingress.config, policies);
                if canary.is_by_header() {
                    let baseline = entry.virtual_service.http[position].clone();
                    apply_by_header(&mut route, &baseline, &ingress.config);
                    debug!(canary = %route.name, baseline = %baseline.name, "merged header canary");
                    canary_routes.insert(route.name.clone());
                    entry.virtual_service.http.insert(position, route);
                } else {
                    let baseline = &mut entry.virtual_service.http[position];
                    apply_by_weight(&mut route, baseline, &ingress.config);
                    debug!(canary = %route.name, baseline = %baseline.name, weight = canary.weight, "merged weight canary");
                    weight_totals.insert((host, baseline.name.clone()), canary.weight_total);
                }
            }
        }

        for ((host, name), total) in weight_totals {
            if let Some(route) = hosts
                .get_mut(&host)
                .and_then(|entry| entry.virtual_service.http.iter_mut().find(|r| r.name == name))
            {
                normalize_weights(route, total);
            }
        }
    }

    /// `(host, route)` for every usable path, handlers applied
    fn routes(&self, ingress: &ParsedIngress, ctx: &GlobalContext) -> Vec<(String, HttpRoute)> {
        let config = &ingress.config;
        let Some(spec) = &ingress.source.spec else {
            return Vec::new();
        };

        let mut routes = Vec::new();
        let rules = spec.rules.as_deref().unwrap_or_default();
        for (rule_index, rule) in rules.iter().enumerate() {
            let host = rule.host.clone().filter(|h| !h.is_empty()).unwrap_or_else(|| WILDCARD_HOST.to_string());
            let paths = rule.http.as_ref().map(|http| http.paths.as_slice()).unwrap_or_default();
            for (path_index, path) in paths.iter().enumerate() {
                let name = format!("{}-{}-{rule_index}-{path_index}", config.meta.namespace, config.meta.name);
                if let Some(route) = self.route(name, path, config, ctx) {
                    routes.push((host.clone(), route));
                }
            }
        }

        if rules.is_empty() {
            if let Some(backend) = &spec.default_backend {
                let path = HTTPIngressPath {
                    backend: backend.clone(),
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                };
                let name = format!("{}-{}-default", config.meta.namespace, config.meta.name);
                if let Some(route) = self.route(name, &path, config, ctx) {
                    routes.push((WILDCARD_HOST.to_string(), route));
                }
            }
        }
        routes
    }

    fn route(&self, name: String, path: &HTTPIngressPath, config: &Ingress, ctx: &GlobalContext) -> Option<HttpRoute> {
        let Some(destination) = destination(&path.backend, config, ctx) else {
            warn!(ingress = %config.meta.key(), route = %name, "skipping path without a service backend");
            return None;
        };
        let raw_path = path.path.as_deref().filter(|p| !p.is_empty()).unwrap_or("/");

        let mut route = HttpRoute {
            name,
            r#match: uri_matches(&path.path_type, raw_path, config.rewrite.as_ref())
                .into_iter()
                .map(|uri| HttpMatchRequest { uri: Some(uri), ..Default::default() })
                .collect(),
            route: vec![HttpRouteDestination { destination, weight: 100, ..Default::default() }],
            ..Default::default()
        };
        self.manager.apply_route(&mut route, config);
        Some(route)
    }

    /// Servers terminating TLS for the ingress, one per TLS host
    fn add_https_servers(&self, ingress: &ParsedIngress, gateway: &mut Gateway) {
        let config = &ingress.config;
        let tls_entries = ingress.source.spec.as_ref().and_then(|s| s.tls.as_deref()).unwrap_or_default();

        let mut fragment = Gateway::default();
        for tls in tls_entries {
            let Some(secret) = tls.secret_name.as_deref().filter(|s| !s.is_empty()) else {
                warn!(ingress = %config.meta.key(), "skipping tls entry without a secret");
                continue;
            };
            let hosts = tls.hosts.clone().filter(|h| !h.is_empty()).unwrap_or_else(|| vec![WILDCARD_HOST.to_string()]);
            for host in hosts {
                fragment.servers.push(Server {
                    name: host.clone(),
                    port: Port { number: HTTPS_PORT, protocol: "HTTPS".to_string(), name: format!("https-{HTTPS_PORT}") },
                    hosts: vec![host],
                    tls: Some(ServerTlsSettings {
                        credential_name: credential_name(&config.meta.raw_cluster_id, &config.meta.namespace, secret),
                        ..Default::default()
                    }),
                });
            }
        }
        if fragment.servers.is_empty() {
            return;
        }

        self.manager.apply_gateway(&mut fragment, config);
        for server in fragment.servers {
            if gateway.servers.iter().any(|s| s.name == server.name) {
                debug!(server = %server.name, ingress = %config.meta.key(), "https server already declared");
                continue;
            }
            gateway.servers.push(server);
        }
    }

    fn add_traffic_policies(&self, route: &HttpRoute, config: &Ingress, policies: &mut BTreeMap<String, TrafficPolicy>) {
        for destination in route.route.iter().map(|d| &d.destination) {
            let port = destination.port.map(|p| p.number).unwrap_or_default();
            policies.entry(format!("{}:{port}", destination.host)).or_insert_with(|| {
                let mut policy = TrafficPolicy { port: destination.port, ..Default::default() };
                self.manager.apply_traffic_policy(&mut policy, config);
                policy
            });
        }
    }
}

fn destination(backend: &IngressBackend, config: &Ingress, ctx: &GlobalContext) -> Option<Destination> {
    let service = backend.service.as_ref()?;
    let namespace = &config.meta.namespace;
    let port = service.port.as_ref().and_then(|port| match (port.number, port.name.as_deref()) {
        (Some(number), _) => u32::try_from(number).ok(),
        (None, Some(port_name)) => ctx
            .service(&config.meta.cluster_id, namespace, &service.name)
            .ok()
            .and_then(|svc| service_port_by_name(&svc, port_name)),
        (None, None) => None,
    });
    Some(Destination::new(service_host(&service.name, namespace, &ctx.domain_suffix), port))
}

/// URI matchers for an ingress path.
///
/// Regex mode, forced by the rewrite features, overrides the path type: the
/// path is kept as written and anchored either as a prefix (`.*`) or as the
/// full path (`$`). A prefix path other than `/` matches itself exactly plus
/// everything below it, so `/api` never matches `/apiary`.
fn uri_matches(path_type: &str, path: &str, rewrite: Option<&RewriteConfig>) -> Vec<StringMatch> {
    if let Some(rewrite) = rewrite.filter(|r| r.need_regex_match()) {
        let anchor = if rewrite.full_path_regex { "$" } else { ".*" };
        return vec![StringMatch::regex(format!("{path}{anchor}"))];
    }
    if path_type == "Exact" {
        return vec![StringMatch::exact(path)];
    }
    if path == "/" {
        return vec![StringMatch::prefix(path)];
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    vec![StringMatch::exact(trimmed), StringMatch::prefix(format!("{trimmed}/"))]
}

fn same_uris(a: &HttpRoute, b: &HttpRoute) -> bool {
    a.r#match.iter().map(|m| m.uri.as_ref()).eq(b.r#match.iter().map(|m| m.uri.as_ref()))
}

/// Exact before regex before prefix, longer values first within a kind.
/// A route is ranked by its broadest matcher, the last one.
fn route_rank(route: &HttpRoute) -> (u8, Reverse<usize>) {
    match route.r#match.last().and_then(|m| m.uri.as_ref()) {
        Some(StringMatch::Exact(v)) => (0, Reverse(v.len())),
        Some(StringMatch::Regex(v)) => (1, Reverse(v.len())),
        Some(StringMatch::Prefix(v)) => (2, Reverse(v.len())),
        None => (3, Reverse(0)),
    }
}
