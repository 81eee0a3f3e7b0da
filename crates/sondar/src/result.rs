//! Result and error types for Sondar.

use thiserror::Error;

/// Result type for Sondar operations
pub type SondarResult<T> = Result<T, SondarError>;

/// Errors that can occur in Sondar
///
/// An absent transient element is deliberately not represented here: the
/// resolver reports it as [`crate::Resolution::Absent`].
#[derive(Debug, Error)]
pub enum SondarError {
    /// Operation exceeded its time bound
    #[error("Timed out after {ms}ms waiting for {operation}")]
    Timeout {
        /// What was being waited for
        operation: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Expected content, status or visual condition not met
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Transport-level failure of a remote call (no response received)
    #[error("Remote call {method} {url} failed: {message}")]
    RemoteCallFailed {
        /// HTTP method
        method: String,
        /// Target URL
        url: String,
        /// Error message
        message: String,
    },

    /// Cleanup of a created remote resource could not be verified
    #[error("Resource leak: {resource} was not cleaned up ({reason})")]
    ResourceLeak {
        /// Resource description (kind and id)
        resource: String,
        /// Why cleanup was not verified
        reason: String,
    },

    /// Predicate is malformed (empty marker set, invalid pattern)
    #[error("Invalid predicate: {message}")]
    InvalidPredicate {
        /// Error message
        message: String,
    },

    /// Configuration error (missing credential, unreadable config)
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Browser driver error
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Image decoding, encoding or comparison error
    #[error("Image comparison failed: {message}")]
    ImageComparison {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used at the scenario boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Time bound exceeded
    Timeout,
    /// Expectation not met
    Assertion,
    /// Transport failure
    RemoteCall,
    /// Unverified cleanup
    ResourceLeak,
    /// Bad predicate or configuration
    Configuration,
    /// Browser, screenshot, image or I/O failure
    Environment,
}

impl SondarError {
    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            ms,
        }
    }

    /// Create an assertion error
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create an invalid predicate error
    #[must_use]
    pub fn invalid_predicate(message: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::AssertionFailed { .. } => ErrorKind::Assertion,
            Self::RemoteCallFailed { .. } => ErrorKind::RemoteCall,
            Self::ResourceLeak { .. } => ErrorKind::ResourceLeak,
            Self::InvalidPredicate { .. } | Self::Config { .. } => ErrorKind::Configuration,
            Self::Driver { .. }
            | Self::Navigation { .. }
            | Self::Screenshot { .. }
            | Self::ImageComparison { .. }
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Environment,
        }
    }

    /// Whether this error is a timeout rather than a failed expectation
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = SondarError::timeout("networkidle", 30_000);
        assert_eq!(
            err.to_string(),
            "Timed out after 30000ms waiting for networkidle"
        );
        assert!(err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            SondarError::assertion("status 500").kind(),
            ErrorKind::Assertion
        );
        assert_eq!(
            SondarError::invalid_predicate("empty").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            SondarError::ResourceLeak {
                resource: "user 7".into(),
                reason: "status 500".into(),
            }
            .kind(),
            ErrorKind::ResourceLeak
        );
        let io = SondarError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.kind(), ErrorKind::Environment);
    }

    #[test]
    fn test_remote_call_display() {
        let err = SondarError::RemoteCallFailed {
            method: "GET".into(),
            url: "https://example.com".into(),
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("GET https://example.com"));
        assert_eq!(err.kind(), ErrorKind::RemoteCall);
        assert!(!err.is_timeout());
    }
}
