//! # Configuration Management
//!
//! Settings are layered with the `config` crate: built-in defaults, an optional
//! file (YAML, TOML or JSON, inferred from the extension), then environment
//! variables prefixed with `INGRESS_POLICY__` using `__` as the nesting separator
//! (for example `INGRESS_POLICY__ENGINE__CLUSTER_ID`).

pub mod settings;

pub use settings::{EngineConfig, LoggingConfig, Settings};

use crate::Result;
use config::{Config, Environment, File};
use std::path::Path;

/// Environment prefix for settings overrides
pub const ENV_PREFIX: &str = "INGRESS_POLICY";

impl Settings {
    /// Load settings from an optional file and the environment, then validate them
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_partial_yaml_file_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().expect("tempfile");
        writeln!(file, "engine:\n  cluster_id: c1\n  domain_suffix: mesh.local").expect("write");

        let settings = Settings::load(Some(file.path())).expect("load settings");
        assert_eq!(settings.engine.cluster_id, "c1");
        assert_eq!(settings.engine.domain_suffix, "mesh.local");
        assert_eq!(settings.engine.gateway_name, "higress-gateway");
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().expect("tempfile");
        writeln!(file, "logging:\n  level: \"\"").expect("write");

        let err = Settings::load(Some(file.path())).expect_err("empty level rejected");
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/ingress-policy.yaml")))
            .expect_err("missing file");
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
