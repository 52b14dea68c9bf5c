//! Annotation-level failures.
//!
//! Absence of a key and a malformed value are distinct variants so callers can
//! decide whether "present but invalid" should suppress a default.

/// Why a single annotation lookup or feature resolution failed
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    /// The key is absent from the annotation map
    #[error("annotation {key} is missing")]
    Missing { key: String },

    /// The key is present but its value is blank after normalisation
    #[error("annotation {key} contains invalid content")]
    InvalidContent { key: String },

    /// The key is present but the value fails its declared format
    #[error("annotation {key} has invalid value {value:?}: {reason}")]
    InvalidValue { key: String, value: String, reason: String },

    /// The feature key itself is malformed
    #[error("annotation name {key:?} is invalid")]
    InvalidName { key: String },

    /// A referenced Secret or Service could not be resolved
    #[error("{kind} {namespace}/{name} not found in cluster {cluster:?}")]
    MissingReference { kind: &'static str, namespace: String, name: String, cluster: String },

    /// The value names a mode this engine does not implement
    #[error("annotation {key} value {value:?} is not supported")]
    Unsupported { key: String, value: String },
}

impl AnnotationError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing { key: key.into() }
    }

    pub fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue { key: key.into(), value: value.into(), reason: reason.into() }
    }

    pub fn missing_reference(
        kind: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self::MissingReference {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            cluster: cluster.into(),
        }
    }

    pub fn unsupported(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Unsupported { key: key.into(), value: value.into() }
    }

    /// True when the key was simply absent
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}
