//! # Error Handling
//!
//! Error types for the ingress policy engine. [`Error`] is the crate-level error
//! returned by configuration loading, manifest decoding and filter projection.
//! [`AnnotationError`] describes why a single annotation-driven feature could not
//! be applied; it never aborts the processing of an ingress resource.

pub mod annotation;

pub use annotation::AnnotationError;

/// Custom result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the ingress policy engine
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest or payload (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Annotation errors surfaced outside the best-effort parse pass
    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    /// Ingress objects that cannot be translated at all
    #[error(transparent)]
    Translate(#[from] crate::translate::TranslateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
