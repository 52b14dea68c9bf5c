//! RBAC per-route configuration for IP access control.
//!
//! An allow list becomes an `ALLOW` policy over the listed remote IP ranges,
//! a deny list becomes a `DENY` policy. Either way the permission side matches
//! every request.

use crate::mesh::IpAccessControl;
use crate::xds::filters::{any_from_message, invalid_config};
use envoy_types::pb::envoy::config::core::v3::CidrRange;
use envoy_types::pb::envoy::config::rbac::v3::{
    permission, principal, rbac, Permission, Policy, Principal, Rbac as RbacRulesProto,
};
use envoy_types::pb::envoy::extensions::filters::http::rbac::v3::{
    Rbac as RbacProto, RbacPerRoute as RbacPerRouteProto,
};
use envoy_types::pb::google::protobuf::{Any as EnvoyAny, UInt32Value};
use std::collections::HashMap;
use std::net::IpAddr;

pub const RBAC_PER_ROUTE_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.rbac.v3.RBACPerRoute";

const POLICY_NAME: &str = "ip-access-control";

/// Parse `addr` or `addr/len` into an Envoy CIDR range
pub fn cidr_range(block: &str) -> Result<CidrRange, crate::Error> {
    let (address, prefix_len) = match block.split_once('/') {
        Some((address, len)) => {
            let len = len
                .parse::<u32>()
                .map_err(|_| invalid_config(format!("invalid prefix length in {block:?}")))?;
            (address, Some(len))
        }
        None => (block, None),
    };
    let ip: IpAddr = address
        .parse()
        .map_err(|_| invalid_config(format!("invalid ip address in {block:?}")))?;
    let max = if ip.is_ipv4() { 32 } else { 128 };
    let prefix_len = prefix_len.unwrap_or(max);
    if prefix_len > max {
        return Err(invalid_config(format!("prefix length of {block:?} exceeds {max}")));
    }

    Ok(CidrRange {
        address_prefix: ip.to_string(),
        prefix_len: Some(UInt32Value { value: prefix_len }),
    })
}

fn remote_ips(blocks: &[String]) -> Result<Principal, crate::Error> {
    let ids = blocks
        .iter()
        .map(|block| {
            cidr_range(block).map(|range| Principal {
                identifier: Some(principal::Identifier::RemoteIp(range)),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Principal { identifier: Some(principal::Identifier::OrIds(principal::Set { ids })) })
}

/// Build the per-route RBAC proto for an IP access control attachment
pub fn to_proto(config: &IpAccessControl) -> Result<RbacPerRouteProto, crate::Error> {
    let (action, blocks) = if !config.remote_ip_blocks.is_empty() {
        (rbac::Action::Allow, &config.remote_ip_blocks)
    } else if !config.not_remote_ip_blocks.is_empty() {
        (rbac::Action::Deny, &config.not_remote_ip_blocks)
    } else {
        return Err(invalid_config("ip access control requires at least one ip block"));
    };

    let policy = Policy {
        permissions: vec![Permission { rule: Some(permission::Rule::Any(true)) }],
        principals: vec![remote_ips(blocks)?],
        ..Default::default()
    };
    let rules = RbacRulesProto {
        action: action as i32,
        policies: HashMap::from([(POLICY_NAME.to_string(), policy)]),
        ..Default::default()
    };

    Ok(RbacPerRouteProto { rbac: Some(RbacProto { rules: Some(rules), ..Default::default() }) })
}

pub fn to_any(config: &IpAccessControl) -> Result<EnvoyAny, crate::Error> {
    Ok(any_from_message(RBAC_PER_ROUTE_TYPE_URL, &to_proto(config)?))
}
