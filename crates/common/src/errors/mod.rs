//! Error types for CiteForge
//!
//! Provides a single error enum shared by the graph engine and the explorer:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Classification helpers used to decide log severity

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFilter,

    // Identifier errors (2xxx)
    UnresolvableIdentifier,

    // Resource errors (4xxx)
    EntityNotFound,
    NodeNotFound,

    // Payload errors (5xxx)
    MalformedEntity,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    UpstreamError,
    UpstreamTimeout,
    FetchFailed,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFilter => 1002,

            ErrorCode::UnresolvableIdentifier => 2001,

            ErrorCode::EntityNotFound => 4001,
            ErrorCode::NodeNotFound => 4002,

            ErrorCode::MalformedEntity => 5001,

            ErrorCode::RateLimited => 6001,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::UpstreamTimeout => 8002,
            ErrorCode::FetchFailed => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid filter on '{property}': {message}")]
    InvalidFilter { property: String, message: String },

    // Identifier errors
    #[error("Cannot resolve identifier '{input}' to a known entity type")]
    UnresolvableIdentifier { input: String },

    // Resource errors
    #[error("Entity not found: {entity_type}/{id}")]
    EntityNotFound { entity_type: String, id: String },

    #[error("Graph node not found: {id}")]
    NodeNotFound { id: String },

    // Payload errors
    #[error("Malformed {entity_type} entity: {message}")]
    MalformedEntity { entity_type: String, message: String },

    // Rate limiting
    #[error("Rate limit exceeded by upstream: {message}")]
    RateLimited { message: String },

    // External service errors
    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream timeout after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    /// A fetch failed; every caller coalesced onto the same in-flight
    /// request receives the same shared source error.
    #[error("Fetch failed for '{key}': {source}")]
    FetchFailed {
        key: String,
        #[source]
        source: Arc<AppError>,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFilter { .. } => ErrorCode::InvalidFilter,
            AppError::UnresolvableIdentifier { .. } => ErrorCode::UnresolvableIdentifier,
            AppError::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            AppError::NodeNotFound { .. } => ErrorCode::NodeNotFound,
            AppError::MalformedEntity { .. } => ErrorCode::MalformedEntity,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::UpstreamTimeout { .. } => ErrorCode::UpstreamTimeout,
            AppError::FetchFailed { .. } => ErrorCode::FetchFailed,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// The innermost error, looking through coalesced fetch failures
    pub fn root(&self) -> &AppError {
        match self {
            AppError::FetchFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the upstream payload failed its type-discrimination check
    pub fn is_malformed(&self) -> bool {
        matches!(self.root(), AppError::MalformedEntity { .. })
    }

    /// Whether the failure came from the network or the upstream API
    pub fn is_upstream(&self) -> bool {
        matches!(
            self.root(),
            AppError::Upstream { .. }
                | AppError::UpstreamTimeout { .. }
                | AppError::RateLimited { .. }
                | AppError::EntityNotFound { .. }
                | AppError::HttpClient(_)
        )
    }

    /// Whether the caller supplied bad input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.root(),
            AppError::Validation { .. }
                | AppError::InvalidFilter { .. }
                | AppError::UnresolvableIdentifier { .. }
                | AppError::NodeNotFound { .. }
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::NodeNotFound { id: "W1".into() };
        assert_eq!(err.code(), ErrorCode::NodeNotFound);
        assert_eq!(err.code().as_code(), 4002);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_fetch_failed_exposes_root() {
        let root = Arc::new(AppError::Upstream {
            status: 503,
            message: "unavailable".into(),
        });
        let err = AppError::FetchFailed {
            key: "W1".into(),
            source: root,
        };
        assert_eq!(err.code(), ErrorCode::FetchFailed);
        assert!(err.is_upstream());
        assert!(!err.is_malformed());
        assert!(matches!(err.root(), AppError::Upstream { status: 503, .. }));
    }

    #[test]
    fn test_malformed_classification() {
        let err = AppError::FetchFailed {
            key: "A1".into(),
            source: Arc::new(AppError::MalformedEntity {
                entity_type: "authors".into(),
                message: "missing id".into(),
            }),
        };
        assert!(err.is_malformed());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_config_errors_convert() {
        let err: AppError = config::ConfigError::Message("bad port".into()).into();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
        assert!(err.to_string().contains("bad port"));
    }
}
