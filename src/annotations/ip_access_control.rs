//! Source IP allow and deny lists, per virtual host or per route.

use super::util::split_by_comma;
use super::{
    Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler,
    VirtualServiceHandler,
};
use crate::errors::AnnotationError;
use crate::mesh::{HttpFilter, HttpFilterConfig, HttpRoute, IpAccessControl as IpFilter, VirtualService};
use serde::Serialize;

const DOMAIN_WHITELIST: &str = "domain-whitelist-source-range";
const DOMAIN_BLACKLIST: &str = "domain-blacklist-source-range";
const WHITELIST: &str = "whitelist-source-range";
const BLACKLIST: &str = "blacklist-source-range";

pub const FILTER_NAME: &str = "ip-access-control";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRule {
    /// Allow list when true, deny list otherwise
    pub is_white: bool,
    pub remote_ip: Vec<String>,
}

impl IpRule {
    fn to_filter(&self) -> HttpFilter {
        let mut filter = IpFilter::default();
        if self.is_white {
            filter.remote_ip_blocks = self.remote_ip.clone();
        } else {
            filter.not_remote_ip_blocks = self.remote_ip.clone();
        }
        HttpFilter {
            name: FILTER_NAME.to_string(),
            disable: false,
            filter: HttpFilterConfig::IpAccessControl(filter),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAccessControlConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<IpRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<IpRule>,
}

pub struct IpAccessControl;

impl Parser for IpAccessControl {
    fn name(&self) -> &'static str {
        "ip-access-control"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !need_ip_access_control_config(annotations) {
            return Ok(Parsed::Absent);
        }

        // The allow list wins when both lists are given for the same scope.
        let domain = rule(
            annotations.parse_string_native(DOMAIN_WHITELIST),
            annotations.parse_string_native(DOMAIN_BLACKLIST),
        );
        let route = rule(
            annotations.parse_string_asap(WHITELIST),
            annotations.parse_string_asap(BLACKLIST),
        );

        config.ip_access_control = Some(IpAccessControlConfig { domain, route });
        Ok(Parsed::Applied)
    }
}

impl VirtualServiceHandler for IpAccessControl {
    fn apply_virtual_service(&self, virtual_service: &mut VirtualService, config: &Ingress) {
        if let Some(domain) = config.ip_access_control.as_ref().and_then(|c| c.domain.as_ref()) {
            virtual_service.host_http_filters.push(domain.to_filter());
        }
    }
}

impl RouteHandler for IpAccessControl {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        if let Some(rule) = config.ip_access_control.as_ref().and_then(|c| c.route.as_ref()) {
            route.route_http_filters.push(rule.to_filter());
        }
    }
}

fn rule(
    white: Result<String, AnnotationError>,
    black: Result<String, AnnotationError>,
) -> Option<IpRule> {
    if let Ok(list) = white {
        return Some(IpRule { is_white: true, remote_ip: split_by_comma(&list) });
    }
    black.ok().map(|list| IpRule { is_white: false, remote_ip: split_by_comma(&list) })
}

fn need_ip_access_control_config(annotations: &Annotations) -> bool {
    annotations.has_native(DOMAIN_WHITELIST)
        || annotations.has_native(DOMAIN_BLACKLIST)
        || annotations.has_asap(WHITELIST)
        || annotations.has_asap(BLACKLIST)
}
