//! Request and response header manipulation.

use super::util::split_by_comma;
use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser, RouteHandler};
use crate::mesh::{HeaderOperations, Headers, HttpRoute};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;

const REQUEST_HEADER_ADD: &str = "request-header-control-add";
const REQUEST_HEADER_UPDATE: &str = "request-header-control-update";
const REQUEST_HEADER_REMOVE: &str = "request-header-control-remove";
const RESPONSE_HEADER_ADD: &str = "response-header-control-add";
const RESPONSE_HEADER_UPDATE: &str = "response-header-control-update";
const RESPONSE_HEADER_REMOVE: &str = "response-header-control-remove";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderOperation {
    pub add: BTreeMap<String, String>,
    pub update: BTreeMap<String, String>,
    pub remove: Vec<String>,
}

impl HeaderOperation {
    fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    fn to_mesh(&self) -> HeaderOperations {
        HeaderOperations {
            set: self.update.clone(),
            add: self.add.clone(),
            remove: self.remove.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderControlConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderOperation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HeaderOperation>,
}

pub struct HeaderControl;

impl Parser for HeaderControl {
    fn name(&self) -> &'static str {
        "header-control"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !need_header_control_config(annotations) {
            return Ok(Parsed::Absent);
        }

        let request = operation(annotations, REQUEST_HEADER_ADD, REQUEST_HEADER_UPDATE, REQUEST_HEADER_REMOVE);
        let response = operation(annotations, RESPONSE_HEADER_ADD, RESPONSE_HEADER_UPDATE, RESPONSE_HEADER_REMOVE);

        config.header_control = Some(HeaderControlConfig {
            request: (!request.is_empty()).then_some(request),
            response: (!response.is_empty()).then_some(response),
        });
        Ok(Parsed::Applied)
    }
}

impl RouteHandler for HeaderControl {
    fn apply_route(&self, route: &mut HttpRoute, config: &Ingress) {
        let Some(control) = &config.header_control else {
            return;
        };

        route.headers = Some(Headers {
            request: control.request.as_ref().map(HeaderOperation::to_mesh),
            response: control.response.as_ref().map(HeaderOperation::to_mesh),
        });
    }
}

fn operation(annotations: &Annotations, add: &str, update: &str, remove: &str) -> HeaderOperation {
    HeaderOperation {
        add: annotations
            .parse_string_native(add)
            .map(|block| parse_header_block(add, &block))
            .unwrap_or_default(),
        update: annotations
            .parse_string_native(update)
            .map(|block| parse_header_block(update, &block))
            .unwrap_or_default(),
        remove: annotations
            .parse_string_native(remove)
            .map(|list| split_by_comma(&list))
            .unwrap_or_default(),
    }
}

/// One `name value` pair per line; surrounding quotes on the value are dropped
fn parse_header_block(key: &str, block: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((name, value)) = line.split_once(char::is_whitespace) else {
            error!(annotation = key, line, "header line needs a name and a value");
            continue;
        };
        headers.insert(name.to_string(), trim_quotes(value.trim()).to_string());
    }
    headers
}

fn trim_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

fn need_header_control_config(annotations: &Annotations) -> bool {
    [
        REQUEST_HEADER_ADD,
        REQUEST_HEADER_UPDATE,
        REQUEST_HEADER_REMOVE,
        RESPONSE_HEADER_ADD,
        RESPONSE_HEADER_UPDATE,
        RESPONSE_HEADER_REMOVE,
    ]
    .iter()
    .any(|key| annotations.has_native(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;

    fn parse(pairs: &[(String, &str)]) -> Option<HeaderControlConfig> {
        let mut config = ingress("default", "web");
        let _ = HeaderControl.parse(&annotations(pairs), &mut config, &mut GlobalContext::default());
        config.header_control
    }

    #[test]
    fn nginx_keys_do_not_request_header_control() {
        assert!(parse(&[(nginx(REQUEST_HEADER_ADD), "one 1")]).is_none());
    }

    #[test]
    fn parses_multi_line_blocks_and_remove_lists() {
        let control = parse(&[
            (native(REQUEST_HEADER_ADD), "one 1\n  two \"2\"\nbroken\n"),
            (native(REQUEST_HEADER_UPDATE), "three 'three value'"),
            (native(RESPONSE_HEADER_REMOVE), "x-a, x-b,,"),
        ])
        .expect("header control");

        let request = control.request.expect("request");
        assert_eq!(request.add.len(), 2);
        assert_eq!(request.add["two"], "2");
        assert_eq!(request.update["three"], "three value");
        assert!(request.remove.is_empty());

        let response = control.response.expect("response");
        assert_eq!(response.remove, vec!["x-a", "x-b"]);
    }

    #[test]
    fn route_gets_set_add_and_remove() {
        let mut config = ingress("default", "web");
        config.header_control = Some(HeaderControlConfig {
            request: Some(HeaderOperation {
                add: [("one".to_string(), "1".to_string())].into(),
                update: [("two".to_string(), "2".to_string())].into(),
                remove: vec!["three".into()],
            }),
            response: None,
        });
        let mut route = HttpRoute::default();
        HeaderControl.apply_route(&mut route, &config);

        let headers = route.headers.expect("headers");
        let request = headers.request.expect("request");
        assert_eq!(request.add["one"], "1");
        assert_eq!(request.set["two"], "2");
        assert_eq!(request.remove, vec!["three"]);
        assert!(headers.response.is_none());
    }
}
