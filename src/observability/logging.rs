//! # Structured Logging
//!
//! Span macros and subscriber initialisation built on the tracing ecosystem.
//! Every ingress pass runs inside an `ingress` span so parser and handler
//! events can be correlated by namespace and name.

use crate::config::{LoggingConfig, Settings};
use crate::errors::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Create a tracing span for one ingress resource pass.
///
/// ```rust,ignore
/// let span = ingress_span!("default", "web");
/// let span = ingress_span!("default", "web", phase = "route");
/// ```
#[macro_export]
macro_rules! ingress_span {
    ($namespace:expr, $name:expr) => {
        tracing::info_span!("ingress", namespace = %$namespace, name = %$name)
    };
    ($namespace:expr, $name:expr, $($field:tt)*) => {
        tracing::info_span!("ingress", namespace = %$namespace, name = %$name, $($field)*)
    };
}

/// Create a debug span for a single handler phase
#[macro_export]
macro_rules! phase_span {
    ($phase:expr) => {
        tracing::debug_span!("apply_phase", phase = %$phase)
    };
    ($phase:expr, $($field:tt)*) => {
        tracing::debug_span!("apply_phase", phase = %$phase, $($field)*)
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. A subscriber that is already
/// installed (integration tests, embedding applications) is left in place.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = if config.json { builder.json().try_init() } else { builder.try_init() };
    if installed.is_err() {
        tracing::debug!("global subscriber already installed, keeping it");
    }
    Ok(())
}

/// Log configuration at startup
pub fn log_settings_info(settings: &Settings) {
    tracing::info!(
        cluster_id = %settings.engine.cluster_id,
        domain_suffix = %settings.engine.domain_suffix,
        gateway = %settings.engine.gateway_ref(),
        json_logging = settings.logging.json,
        "Ingress policy engine configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = ingress_span!("default", "web");
        let _span = ingress_span!("default", "web", cluster = "c1");
        let _span = phase_span!("route");
        let _span = phase_span!("route", route = "web-0");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        init_logging(&config).expect("first init");
        init_logging(&config).expect("second init is ignored");
    }

    #[test]
    fn test_log_settings_info() {
        log_settings_info(&Settings::default());
    }
}
