//! Binding of an ingress to a named HTTP-to-RPC conversion resource.

use super::{Annotations, GlobalContext, Ingress, ParseResult, Parsed, Parser};
use serde::Serialize;

const RPC_DESTINATION_NAME: &str = "rpc-destination-name";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Http2RpcConfig {
    pub name: String,
}

pub struct Http2Rpc;

impl Parser for Http2Rpc {
    fn name(&self) -> &'static str {
        "http2rpc"
    }

    fn parse(&self, annotations: &Annotations, config: &mut Ingress, _: &mut GlobalContext) -> ParseResult {
        if !annotations.has_native(RPC_DESTINATION_NAME) {
            return Ok(Parsed::Absent);
        }
        let name = annotations.parse_string_native(RPC_DESTINATION_NAME)?;
        config.http2rpc = Some(Http2RpcConfig { name });
        Ok(Parsed::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::test_support::*;
    use crate::errors::AnnotationError;

    #[test]
    fn native_name_is_recorded() {
        let mut config = ingress("default", "web");
        let a = annotations(&[(native(RPC_DESTINATION_NAME), " dubbo-demo ")]);
        Http2Rpc.parse(&a, &mut config, &mut GlobalContext::default()).expect("parse");
        assert_eq!(config.http2rpc, Some(Http2RpcConfig { name: "dubbo-demo".into() }));
    }

    #[test]
    fn blank_name_is_invalid_content() {
        let mut config = ingress("default", "web");
        let a = annotations(&[(native(RPC_DESTINATION_NAME), "  ")]);
        let result = Http2Rpc.parse(&a, &mut config, &mut GlobalContext::default());
        assert!(matches!(result, Err(AnnotationError::InvalidContent { .. })));
        assert!(config.http2rpc.is_none());
    }
}
