//! Gateway listener configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Gateway {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Server {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub port: Port,
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<ServerTlsSettings>,
}

impl Server {
    /// HTTPS servers terminate TLS and are the only ones downstream TLS applies to
    pub fn is_https(&self) -> bool {
        self.port.protocol.eq_ignore_ascii_case("HTTPS")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Port {
    pub number: u32,
    pub protocol: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerTlsSettings {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub https_redirect: bool,
    pub mode: ServerTlsMode,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub credential_name: String,
    pub min_protocol_version: TlsProtocol,
    pub max_protocol_version: TlsProtocol,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cipher_suites: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerTlsMode {
    Passthrough,
    #[default]
    Simple,
    Mutual,
    AutoPassthrough,
    IstioMutual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsProtocol {
    #[default]
    #[serde(rename = "TLS_AUTO")]
    TlsAuto,
    #[serde(rename = "TLSV1_0")]
    TlsV1_0,
    #[serde(rename = "TLSV1_1")]
    TlsV1_1,
    #[serde(rename = "TLSV1_2")]
    TlsV1_2,
    #[serde(rename = "TLSV1_3")]
    TlsV1_3,
}

impl TlsProtocol {
    /// Map an nginx-style version token (`TLSv1.2`, `TLSv1_2`, ...) to a protocol.
    /// Unknown tokens resolve to `TLS_AUTO`.
    pub fn from_annotation(value: &str) -> Self {
        match value.trim().replace('.', "_").as_str() {
            "TLSv1_0" | "TLSv1" => Self::TlsV1_0,
            "TLSv1_1" => Self::TlsV1_1,
            "TLSv1_2" => Self::TlsV1_2,
            "TLSv1_3" => Self::TlsV1_3,
            _ => Self::TlsAuto,
        }
    }
}
