//! Envoy protobuf rendering of mesh filter attachments.
//!
//! Only the payloads are built here; delivery to proxies is left to the
//! surrounding control plane.

pub mod filters;

pub use filters::http::{filter_to_any, typed_per_filter_config};
pub use filters::TypedConfig;
