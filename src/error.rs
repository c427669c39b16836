//! Error types for the billing deployment system.
//!
//! This module provides the error hierarchy for every stage of a deploy:
//! configuration, the local catalog store, the billing provider API, and the
//! deployment pipeline itself.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the billing deployment system.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Local catalog store errors.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Billing provider API errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Deployment pipeline errors.
    #[error("{0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// The configured billing provider is not supported.
    #[error("Unknown billing provider '{name}' (supported: {supported})")]
    UnknownProvider {
        /// Provider name from configuration.
        name: String,
        /// Comma-separated list of supported providers.
        supported: String,
    },
}

/// Local catalog store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store document is corrupted.
    #[error("Catalog store is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A uniqueness constraint would be violated.
    #[error("Catalog constraint violated: {message}")]
    Conflict {
        /// Description of the violated constraint.
        message: String,
    },

    /// A record addressed by id does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of record.
        resource: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Writing the store document failed.
    #[error("Failed to write catalog store: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// Serialization error.
    #[error("Catalog serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Billing provider API errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication failed.
    #[error("Provider authentication failed: {message}")]
    Authentication {
        /// Description of the auth failure.
        message: String,
    },

    /// Rate limited.
    #[error("Provider rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds the provider asked us to wait.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Connection to provider failed: {message}")]
    Connection {
        /// Description of the network error.
        message: String,
    },

    /// The provider rejected the request parameters.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Message returned by the provider.
        message: String,
        /// Offending parameter, when reported.
        param: Option<String>,
    },

    /// Any other provider failure.
    #[error("Provider request failed: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message returned by the provider.
        message: String,
    },
}

/// Deployment pipeline errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The operator cancelled the deployment.
    #[error("Deployment cancelled: {reason}")]
    Cancelled {
        /// Reason for the cancellation.
        reason: String,
    },

    /// A live deployment failed part-way through.
    #[error(
        "Deployment failed: {source}. Local state may now disagree with the provider; \
         re-run with --dry-run to re-assess"
    )]
    Failed {
        /// The underlying failure.
        #[source]
        source: Box<BillingError>,
    },

    /// No acceptable duplicate key was supplied.
    #[error("No acceptable duplicate key for price '{price_key}' after {attempts} attempts")]
    InvalidDuplicateKey {
        /// Price type key being duplicated.
        price_key: String,
        /// Number of answers rejected.
        attempts: u32,
    },
}

/// Result type alias for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

impl BillingError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_retryable())
    }

    /// Returns the retry hint reported by the provider, if any.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }

    /// Returns true if this error is an operator cancellation.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Deploy(DeployError::Cancelled { .. }))
    }

    /// Wraps this error as a failed live deployment.
    ///
    /// Cancellations and already-wrapped failures are returned unchanged.
    #[must_use]
    pub fn into_deploy_failure(self) -> Self {
        match self {
            Self::Deploy(DeployError::Cancelled { .. } | DeployError::Failed { .. }) => self,
            other => Self::Deploy(DeployError::Failed {
                source: Box::new(other),
            }),
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StoreError {
    /// Creates a conflict error with the given message.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Returns true for failures worth retrying with the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Connection { .. })
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an invalid-request error without a parameter hint.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: None,
        }
    }
}
