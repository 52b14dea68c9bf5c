//! Typed, namespace-aware lookups over one ingress resource's annotations.
//!
//! Every getter comes in three forms: nginx prefix only (`parse_*`), native
//! prefix only (`parse_*_native`) and "as soon as possible" (`parse_*_asap`),
//! which tries the nginx key first and falls back to the native key on any
//! failure, absence included.

use crate::errors::AnnotationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Legacy nginx ingress controller prefix
pub const NGINX_PREFIX: &str = "nginx.ingress.kubernetes.io";
/// Native annotation prefix
pub const NATIVE_PREFIX: &str = "higress.io";
/// Cluster the ingress was read from
pub const CLUSTER_ID_KEY: &str = "internal.higress.io/cluster-id";
/// Cluster id before any rewriting by the multi-cluster layer
pub const RAW_CLUSTER_ID_KEY: &str = "internal.higress.io/raw-cluster-id";

pub fn build_nginx_key(key: &str) -> String {
    format!("{NGINX_PREFIX}/{key}")
}

pub fn build_native_key(key: &str) -> String {
    format!("{NATIVE_PREFIX}/{key}")
}

type Lookup<T> = Result<T, AnnotationError>;

/// Immutable annotation map of a single ingress resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(BTreeMap<String, String>);

impl From<BTreeMap<String, String>> for Annotations {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Annotations {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value for a fully-qualified key
    pub fn get(&self, full_key: &str) -> Option<&str> {
        self.0.get(full_key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Feature keys (prefix stripped) present under the native prefix, with raw values
    pub fn native_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|(key, value)| {
            key.strip_prefix(NATIVE_PREFIX)
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|feature| (feature, value.as_str()))
        })
    }

    /// Keys of the form `<feature_prefix><suffix>` under either prefix, mapped
    /// suffix to normalised value. nginx entries override native ones.
    pub fn suffixed_entries(&self, feature_prefix: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for prefix in [NATIVE_PREFIX, NGINX_PREFIX] {
            let start = format!("{prefix}/{feature_prefix}");
            for (key, value) in self.0.range(start.clone()..) {
                let Some(suffix) = key.strip_prefix(&start) else {
                    break;
                };
                let value = normalize(value);
                if !suffix.is_empty() && !value.trim().is_empty() {
                    out.insert(suffix.to_string(), value);
                }
            }
        }
        out
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(&build_nginx_key(key))
    }

    pub fn has_native(&self, key: &str) -> bool {
        self.0.contains_key(&build_native_key(key))
    }

    pub fn has_asap(&self, key: &str) -> bool {
        self.has(key) || self.has_native(key)
    }

    pub fn parse_string(&self, key: &str) -> Lookup<String> {
        self.lookup(NGINX_PREFIX, key, |_, value| Ok(value))
    }

    pub fn parse_string_native(&self, key: &str) -> Lookup<String> {
        self.lookup(NATIVE_PREFIX, key, |_, value| Ok(value))
    }

    pub fn parse_string_asap(&self, key: &str) -> Lookup<String> {
        asap(self.parse_string(key), || self.parse_string_native(key))
    }

    pub fn parse_bool(&self, key: &str) -> Lookup<bool> {
        self.lookup(NGINX_PREFIX, key, parse_bool_value)
    }

    pub fn parse_bool_native(&self, key: &str) -> Lookup<bool> {
        self.lookup(NATIVE_PREFIX, key, parse_bool_value)
    }

    pub fn parse_bool_asap(&self, key: &str) -> Lookup<bool> {
        asap(self.parse_bool(key), || self.parse_bool_native(key))
    }

    pub fn parse_int(&self, key: &str) -> Lookup<i64> {
        self.lookup(NGINX_PREFIX, key, parse_number)
    }

    pub fn parse_int_native(&self, key: &str) -> Lookup<i64> {
        self.lookup(NATIVE_PREFIX, key, parse_number)
    }

    pub fn parse_int_asap(&self, key: &str) -> Lookup<i64> {
        asap(self.parse_int(key), || self.parse_int_native(key))
    }

    pub fn parse_int32(&self, key: &str) -> Lookup<i32> {
        self.lookup(NGINX_PREFIX, key, parse_number)
    }

    pub fn parse_int32_native(&self, key: &str) -> Lookup<i32> {
        self.lookup(NATIVE_PREFIX, key, parse_number)
    }

    pub fn parse_int32_asap(&self, key: &str) -> Lookup<i32> {
        asap(self.parse_int32(key), || self.parse_int32_native(key))
    }

    pub fn parse_uint32(&self, key: &str) -> Lookup<u32> {
        self.lookup(NGINX_PREFIX, key, parse_number)
    }

    pub fn parse_uint32_native(&self, key: &str) -> Lookup<u32> {
        self.lookup(NATIVE_PREFIX, key, parse_number)
    }

    pub fn parse_uint32_asap(&self, key: &str) -> Lookup<u32> {
        asap(self.parse_uint32(key), || self.parse_uint32_native(key))
    }

    fn lookup<T>(
        &self,
        prefix: &str,
        key: &str,
        convert: impl FnOnce(&str, String) -> Lookup<T>,
    ) -> Lookup<T> {
        validate_feature_key(key)?;
        let full_key = format!("{prefix}/{key}");
        let raw = self.0.get(&full_key).ok_or_else(|| AnnotationError::missing(&full_key))?;
        let value = normalize(raw);
        if value.trim().is_empty() {
            return Err(AnnotationError::InvalidContent { key: full_key });
        }
        convert(&full_key, value)
    }
}

/// Primary result if it succeeded, else the secondary. A primary "present but
/// invalid" failure is kept when the secondary key is simply absent.
fn asap<T>(primary: Lookup<T>, secondary: impl FnOnce() -> Lookup<T>) -> Lookup<T> {
    match primary {
        Ok(value) => Ok(value),
        Err(primary_err) => secondary().map_err(|secondary_err| {
            if secondary_err.is_missing() && !primary_err.is_missing() {
                primary_err
            } else {
                secondary_err
            }
        }),
    }
}

fn validate_feature_key(key: &str) -> Lookup<()> {
    if key.is_empty() || key.contains('/') || key.chars().any(char::is_whitespace) {
        return Err(AnnotationError::InvalidName { key: key.to_string() });
    }
    Ok(())
}

/// Trim every line independently, keeping embedded newlines
pub fn normalize(raw: &str) -> String {
    raw.split('\n').map(str::trim).collect::<Vec<_>>().join("\n")
}

fn parse_bool_value(key: &str, value: String) -> Lookup<bool> {
    match value.as_str() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(AnnotationError::invalid_value(key, value, "expected a boolean")),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: String) -> Lookup<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| AnnotationError::invalid_value(key, value.clone(), e.to_string()))
}
