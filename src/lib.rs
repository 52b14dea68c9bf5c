//! # Ingress Policy
//!
//! Translates the annotations of Kubernetes `Ingress` resources into gateway,
//! route and upstream policy for an Envoy based mesh gateway.
//!
//! Annotations are read from two namespaces, `nginx.ingress.kubernetes.io`
//! for ingress-nginx compatibility and `higress.io` for native features. Each
//! feature is a parser filling a per-ingress model, plus handlers that project
//! the model onto mesh objects:
//!
//! ```text
//! Ingress annotations → Parsers → Ingress model → Handlers → Gateway / VirtualService / TrafficPolicy
//!                                                                   ↓
//!                                                     Envoy per-route filter configs
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ingress_policy::config::EngineConfig;
//! use ingress_policy::translate::Translator;
//! # fn run(ingresses: &[k8s_openapi::api::networking::v1::Ingress]) -> ingress_policy::Result<()> {
//! let translator = Translator::new(EngineConfig::default());
//! let mut ctx = translator.context();
//! let translation = translator.translate(ingresses, &mut ctx)?;
//! println!("{} virtual services", translation.virtual_services.len());
//! # Ok(())
//! # }
//! ```

pub mod annotations;
pub mod cli;
pub mod config;
pub mod errors;
pub mod kube;
pub mod mesh;
pub mod observability;
pub mod translate;
pub mod xds;

pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
