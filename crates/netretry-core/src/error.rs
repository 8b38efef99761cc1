//! Error types for netretry.
//!
//! `NetRetryError` covers failures of the library itself (configuration,
//! probes, connectivity observation). `RetryError` is the outcome error of an
//! operation wrapped by the retry controller and carries the caller's own
//! error type through untouched.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the netretry library.
#[derive(Debug, Error)]
pub enum NetRetryError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connectivity observer ended before the network became available")]
    ConnectivityUnavailable,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // File system errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for netretry operations.
pub type Result<T> = std::result::Result<T, NetRetryError>;

impl From<std::io::Error> for NetRetryError {
    fn from(err: std::io::Error) -> Self {
        NetRetryError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for NetRetryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetRetryError::Timeout(Duration::from_secs(0))
        } else {
            NetRetryError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl NetRetryError {
    /// Shorthand for a validation failure on a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        NetRetryError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Terminal failure of an operation run under network retry.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a connectivity failure.
    #[error("Too many attempts to reconnect to the network (max {max_attempts} attempts)")]
    TooManyAttempts {
        max_attempts: u32,
        #[source]
        last_error: E,
    },

    /// A failure that is not connectivity related, exactly as the producer
    /// reported it.
    #[error(transparent)]
    Fatal(E),

    /// The connectivity observer stopped emitting before the network came back.
    #[error("Connectivity observer ended before the network became available")]
    ConnectivityUnavailable,
}

impl<E> RetryError<E> {
    /// The underlying producer error, if there is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::TooManyAttempts { last_error, .. } => Some(last_error),
            RetryError::Fatal(e) => Some(e),
            RetryError::ConnectivityUnavailable => None,
        }
    }

    /// Borrow the underlying producer error, if there is one.
    pub fn inner(&self) -> Option<&E> {
        match self {
            RetryError::TooManyAttempts { last_error, .. } => Some(last_error),
            RetryError::Fatal(e) => Some(e),
            RetryError::ConnectivityUnavailable => None,
        }
    }

    /// Whether the retry budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::TooManyAttempts { .. })
    }

    /// The attempt cap that was hit, for exhaustion failures.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RetryError::TooManyAttempts { max_attempts, .. } => Some(*max_attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = NetRetryError::validation("max_attempts", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Validation error for max_attempts: must be at least 1"
        );
    }

    #[test]
    fn test_too_many_attempts_display_and_source() {
        let err: RetryError<io::Error> = RetryError::TooManyAttempts {
            max_attempts: 3,
            last_error: io::Error::new(io::ErrorKind::TimedOut, "read timed out"),
        };
        assert_eq!(
            err.to_string(),
            "Too many attempts to reconnect to the network (max 3 attempts)"
        );
        assert_eq!(err.source().unwrap().to_string(), "read timed out");
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), Some(3));
    }

    #[test]
    fn test_fatal_is_transparent() {
        let err: RetryError<io::Error> =
            RetryError::Fatal(io::Error::new(io::ErrorKind::InvalidData, "bad payload"));
        assert_eq!(err.to_string(), "bad payload");
        assert!(!err.is_exhausted());
        let inner = err.into_inner().unwrap();
        assert_eq!(inner.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_connectivity_unavailable_has_no_inner() {
        let err: RetryError<io::Error> = RetryError::ConnectivityUnavailable;
        assert!(err.inner().is_none());
        assert!(err.attempts().is_none());
    }

    #[test]
    fn test_io_conversion() {
        let err: NetRetryError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, NetRetryError::Io { .. }));
    }
}
