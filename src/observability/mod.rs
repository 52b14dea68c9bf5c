//! # Observability Infrastructure
//!
//! Structured logging for the ingress policy engine.

pub mod logging;

pub use logging::{init_logging, log_settings_info};
