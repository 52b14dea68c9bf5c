//! Registration of an ingress as an MCP server endpoint.
//!
//! Nothing is written to the per-ingress model. A valid description is pushed
//! onto [`GlobalContext::mcp_servers`] for the MCP registry to pick up.

use super::util::split_string_with_space_trim;
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser};
use crate::errors::AnnotationError;
use serde::Serialize;
use tracing::{debug, error};

const ENABLE_MCP_SERVER: &str = "mcp-server";
const MATCH_RULE_DOMAINS: &str = "mcp-server-match-rule-domains";
const MATCH_RULE_TYPE: &str = "mcp-server-match-rule-type";
const MATCH_RULE_VALUE: &str = "mcp-server-match-rule-value";
const UPSTREAM_TYPE: &str = "mcp-server-upstream-type";
const ENABLE_PATH_REWRITE: &str = "mcp-server-enable-path-rewrite";
const PATH_REWRITE_PREFIX: &str = "mcp-server-path-rewrite-prefix";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMatchType {
    Exact,
    #[default]
    Prefix,
    Suffix,
    Contains,
    Regex,
}

impl PathMatchType {
    fn from_annotation(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(Self::Exact),
            "prefix" => Some(Self::Prefix),
            "suffix" => Some(Self::Suffix),
            "contains" => Some(Self::Contains),
            "regex" => Some(Self::Regex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamType {
    #[default]
    Rest,
    Sse,
    Streamable,
}

impl UpstreamType {
    fn from_annotation(value: &str) -> Option<Self> {
        match value {
            "rest" => Some(Self::Rest),
            "sse" => Some(Self::Sse),
            "streamable" => Some(Self::Streamable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    /// `namespace/name` of the owning ingress
    pub name: String,
    pub domains: Vec<String>,
    pub path_match_type: PathMatchType,
    pub path_match_value: String,
    pub upstream_type: UpstreamType,
    pub enable_path_rewrite: bool,
    pub path_rewrite_prefix: String,
}

pub struct McpServerRegistration;

impl Parser for McpServerRegistration {
    fn name(&self) -> &'static str {
        "mcp-server"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, ctx: &mut GlobalContext) -> ParseResult {
        if !annotations.parse_bool_native(ENABLE_MCP_SERVER).unwrap_or(false) {
            return Ok(Parsed::Absent);
        }

        let raw_type = annotations.parse_string_native(MATCH_RULE_TYPE)?;
        let path_match_type = PathMatchType::from_annotation(&raw_type)
            .ok_or_else(|| AnnotationError::invalid_value(MATCH_RULE_TYPE, raw_type.clone(), "unknown match type"))?;

        let upstream_type = match annotations.parse_string_native(UPSTREAM_TYPE) {
            Ok(raw) => UpstreamType::from_annotation(&raw)
                .ok_or_else(|| AnnotationError::invalid_value(UPSTREAM_TYPE, raw.clone(), "unknown upstream type"))?,
            Err(_) => UpstreamType::default(),
        };

        let mut domains = annotations
            .parse_string_native(MATCH_RULE_DOMAINS)
            .map(|raw| split_string_with_space_trim(&raw))
            .unwrap_or_default();
        if domains.is_empty() {
            domains.push("*".to_string());
        }

        let enable_path_rewrite = match annotations.parse_bool_native(ENABLE_PATH_REWRITE) {
            Ok(enabled) => enabled,
            Err(err) => {
                if !err.is_missing() && !matches!(err, AnnotationError::InvalidContent { .. }) {
                    error!(error = %err, "ignoring mcp path rewrite flag");
                }
                false
            }
        };

        let server = McpServer {
            name: config.meta.key(),
            domains,
            path_match_type,
            path_match_value: annotations.parse_string_native(MATCH_RULE_VALUE).unwrap_or_default(),
            upstream_type,
            enable_path_rewrite,
            path_rewrite_prefix: annotations.parse_string_native(PATH_REWRITE_PREFIX).unwrap_or_default(),
        };
        debug!(server = %server.name, domains = ?server.domains, "registered mcp server");
        ctx.mcp_servers.push(server);
        Ok(Parsed::Applied)
    }
}
