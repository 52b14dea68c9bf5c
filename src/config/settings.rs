//! # Configuration Settings
//!
//! Defines the configuration structure for the ingress policy engine.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct Settings {
    /// Translation behaviour
    #[validate(nested)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.engine.domain_suffix.starts_with('.') || self.engine.domain_suffix.ends_with('.') {
            return Err(Error::config("Domain suffix must not start or end with '.'"));
        }

        Ok(())
    }
}

/// Settings that influence how annotations are translated
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Cluster used for Service/Secret lookups when an ingress carries no cluster annotation
    pub cluster_id: String,

    /// DNS suffix appended to `name.namespace.svc` when building service hosts
    #[validate(length(min = 1, message = "Domain suffix cannot be empty"))]
    pub domain_suffix: String,

    /// Name of the gateway the generated virtual services bind to
    #[validate(length(min = 1, message = "Gateway name cannot be empty"))]
    pub gateway_name: String,

    /// Namespace of the gateway the generated virtual services bind to
    #[validate(length(min = 1, message = "Gateway namespace cannot be empty"))]
    pub gateway_namespace: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            domain_suffix: "cluster.local".to_string(),
            gateway_name: "higress-gateway".to_string(),
            gateway_namespace: "higress-system".to_string(),
        }
    }
}

impl EngineConfig {
    /// `namespace/name` reference of the owning gateway
    pub fn gateway_ref(&self) -> String {
        format!("{}/{}", self.gateway_namespace, self.gateway_name)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an `EnvFilter` directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub level: String,

    /// Enable JSON structured logging
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}
