//! # Kubernetes Collaborators
//!
//! Read-only lookups of Services and Secrets referenced by annotations.
//! Listers are expected to be backed by an informer cache, so a lookup is an
//! in-memory map read. [`InMemoryLister`] is the implementation used by the CLI
//! and tests.

use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Metadata;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Namespace-scoped lookup of one object kind
pub trait Lister<K>: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Option<K>;
}

pub type ServiceLister = Arc<dyn Lister<Service>>;
pub type SecretLister = Arc<dyn Lister<Secret>>;

/// Lister over an in-memory snapshot keyed by `(namespace, name)`
#[derive(Debug, Clone)]
pub struct InMemoryLister<K> {
    objects: BTreeMap<(String, String), K>,
}

impl<K> Default for InMemoryLister<K> {
    fn default() -> Self {
        Self { objects: BTreeMap::new() }
    }
}

impl<K> InMemoryLister<K>
where
    K: Metadata<Ty = ObjectMeta> + Clone + Send + Sync,
{
    pub fn new(objects: impl IntoIterator<Item = K>) -> Self {
        let mut lister = Self::default();
        for object in objects {
            lister.insert(object);
        }
        lister
    }

    /// Insert or replace an object. Objects without a namespace land in `default`.
    pub fn insert(&mut self, object: K) {
        let meta = object.metadata();
        let namespace = meta.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = meta.name.clone().unwrap_or_default();
        self.objects.insert((namespace, name), object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<K> Lister<K> for InMemoryLister<K>
where
    K: Clone + Send + Sync,
{
    fn get(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects.get(&(namespace.to_string(), name.to_string())).cloned()
    }
}

/// Declared service ports in order
pub fn service_ports(service: &Service) -> Vec<u32> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| ports.iter().filter_map(|p| u32::try_from(p.port).ok()).collect())
        .unwrap_or_default()
}

/// Number of the service port declared under `name`
pub fn service_port_by_name(service: &Service, name: &str) -> Option<u32> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())?
        .iter()
        .find(|p| p.name.as_deref() == Some(name))
        .and_then(|p| u32::try_from(p.port).ok())
}

/// Raw secret payload for `key`, checking `data` then `stringData`
pub fn secret_value(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| bytes.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|value| value.as_bytes().to_vec())
        })
}

/// All secret entries decoded as UTF-8 (lossy), sorted by key
pub fn secret_entries(secret: &Secret) -> BTreeMap<String, String> {
    let mut entries: BTreeMap<String, String> = secret
        .string_data
        .clone()
        .unwrap_or_default();
    if let Some(data) = &secret.data {
        for (key, bytes) in data {
            entries.insert(key.clone(), String::from_utf8_lossy(&bytes.0).into_owned());
        }
    }
    entries
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use k8s_openapi::ByteString;

    pub fn service(namespace: &str, name: &str, ports: &[i32]) -> Service {
        Service {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(
                    ports
                        .iter()
                        .map(|port| ServicePort { port: *port, ..Default::default() })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn lister_finds_objects_by_namespace_and_name() {
        let lister = InMemoryLister::new([service("default", "web", &[80, 8080])]);
        let found = lister.get("default", "web").expect("service present");
        assert_eq!(service_ports(&found), vec![80, 8080]);
        assert!(lister.get("other", "web").is_none());
        assert_eq!(lister.len(), 1);
    }

    #[test]
    fn named_ports_resolve_to_numbers() {
        use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
        let svc = Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![
                    ServicePort { name: Some("http".into()), port: 8080, ..Default::default() },
                    ServicePort { name: Some("grpc".into()), port: 9090, ..Default::default() },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(service_port_by_name(&svc, "grpc"), Some(9090));
        assert_eq!(service_port_by_name(&svc, "admin"), None);
    }

    #[test]
    fn service_without_ports_has_none() {
        let svc = Service::default();
        assert!(service_ports(&svc).is_empty());
    }

    #[test]
    fn secret_helpers_decode_values() {
        let secret = secret("default", "auth", &[("auth", "foo:bar"), ("b", "x")]);
        assert_eq!(secret_value(&secret, "auth"), Some(b"foo:bar".to_vec()));
        assert!(secret_value(&secret, "missing").is_none());
        let entries = secret_entries(&secret);
        assert_eq!(entries.keys().cloned().collect::<Vec<_>>(), vec!["auth", "b"]);
    }
}
