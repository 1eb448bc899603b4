//! Layered error definitions
//!
//! Categorized by source: config / dispatch / publish

use thiserror::Error;

/// Unified error type for configuration and general failures
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Dispatch pipeline error taxonomy
///
/// The variant decides acknowledgement: `InvalidInput` and `UnknownRoute`
/// are never worth redelivering, `Publish` may be.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing/malformed request fields or a payload that does not decode
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Unknown platform, unregistered (platform, task type), or no targets
    #[error("unknown route: {reason}")]
    UnknownRoute { reason: String },

    /// Broker failure while sending a built task
    #[error("publish failed for platform '{platform}': {source}")]
    Publish {
        platform: String,
        #[source]
        source: PublishError,
    },
}

impl DispatchError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn unknown_route(reason: impl Into<String>) -> Self {
        Self::UnknownRoute {
            reason: reason.into(),
        }
    }

    pub fn publish(platform: impl Into<String>, source: PublishError) -> Self {
        Self::Publish {
            platform: platform.into(),
            source,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::UnknownRoute { .. } => "unknown_route",
            Self::Publish { .. } => "publish",
        }
    }

    /// Whether redelivering the same message could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Publish { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Publish failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    /// Channel/connection unavailable; retrying later may succeed
    Transient,
    /// Serialization failure or broker-side rejection
    Permanent,
}

/// Opaque publisher failure
#[derive(Debug, Error)]
#[error("publisher '{publisher}' {kind:?} error: {message}")]
pub struct PublishError {
    pub publisher: String,
    pub kind: PublishErrorKind,
    pub message: String,
}

impl PublishError {
    pub fn transient(publisher: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
            kind: PublishErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(publisher: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
            kind: PublishErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == PublishErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(DispatchError::invalid_input("x").kind(), "invalid_input");
        assert_eq!(DispatchError::unknown_route("x").kind(), "unknown_route");
        let err = DispatchError::publish("youtube", PublishError::permanent("amqp", "nack"));
        assert_eq!(err.kind(), "publish");
    }

    #[test]
    fn test_only_transient_publish_is_transient() {
        assert!(!DispatchError::invalid_input("x").is_transient());
        assert!(!DispatchError::unknown_route("x").is_transient());
        let permanent = DispatchError::publish("tiktok", PublishError::permanent("amqp", "nack"));
        let transient = DispatchError::publish("tiktok", PublishError::transient("amqp", "closed"));
        assert!(!permanent.is_transient());
        assert!(transient.is_transient());
    }

    #[test]
    fn test_display_includes_context() {
        let err = DispatchError::publish(
            "youtube",
            PublishError::transient("amqp", "channel closed"),
        );
        let text = err.to_string();
        assert!(text.contains("youtube"), "got: {text}");
        assert!(text.contains("channel closed"), "got: {text}");
    }
}
