//! Multi-document YAML manifests.
//!
//! Documents are dispatched on `kind`. `List` documents are flattened; kinds
//! other than Ingress, Service and Secret are skipped with a debug event.

use crate::errors::{Error, Result};
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Manifest {
    pub ingresses: Vec<Ingress>,
    pub services: Vec<Service>,
    pub secrets: Vec<Secret>,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw).map_err(|err| Error::serialization(format!("{}: {err}", path.display())))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let mut manifest = Self::default();
        for document in serde_yaml::Deserializer::from_str(raw) {
            let value = Value::deserialize(document)?;
            manifest.push(value)?;
        }
        Ok(manifest)
    }

    /// Merge the objects of `other` into this manifest
    pub fn extend(&mut self, other: Manifest) {
        self.ingresses.extend(other.ingresses);
        self.services.extend(other.services);
        self.secrets.extend(other.secrets);
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();
        match kind.as_str() {
            "Ingress" => self.ingresses.push(serde_yaml::from_value(value)?),
            "Service" => self.services.push(serde_yaml::from_value(value)?),
            "Secret" => self.secrets.push(serde_yaml::from_value(value)?),
            "List" => {
                let items = value.get("items").and_then(Value::as_sequence).cloned().unwrap_or_default();
                for item in items {
                    self.push(item)?;
                }
            }
            "" => return Err(Error::serialization("manifest document has no kind")),
            other => debug!(kind = other, "skipping unsupported manifest kind"),
        }
        Ok(())
    }
}
