//! Failure classification for the retry controller.
//!
//! Exactly two categories of failure are worth waiting for the network over:
//! a timeout and an I/O failure. Everything else is fatal. The I/O rule is
//! deliberately broad; an I/O error unrelated to connectivity (a truncated
//! body, say) is still retried.

use crate::error::NetRetryError;
use std::error::Error as StdError;
use std::io;
use tokio::time::error::Elapsed;

/// How the retry controller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Lost connectivity: wait for the network and try again.
    Connectivity,
    /// Anything else: surface to the caller untouched.
    Fatal,
}

impl FailureKind {
    pub fn is_connectivity(self) -> bool {
        self == FailureKind::Connectivity
    }
}

/// Errors the retry controller knows how to classify.
pub trait ClassifyFailure {
    fn failure_kind(&self) -> FailureKind;
}

impl ClassifyFailure for io::Error {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Connectivity
    }
}

impl ClassifyFailure for Elapsed {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Connectivity
    }
}

impl ClassifyFailure for reqwest::Error {
    fn failure_kind(&self) -> FailureKind {
        // Transport-level failures only; an HTTP status or a bad payload means
        // the network worked.
        if self.is_status() || self.is_decode() || self.is_builder() || self.is_redirect() {
            FailureKind::Fatal
        } else if self.is_timeout() || self.is_connect() || self.is_request() || self.is_body() {
            FailureKind::Connectivity
        } else {
            FailureKind::Fatal
        }
    }
}

impl ClassifyFailure for NetRetryError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            NetRetryError::Network { .. } | NetRetryError::Timeout(_) | NetRetryError::Io { .. } => {
                FailureKind::Connectivity
            }
            _ => FailureKind::Fatal,
        }
    }
}

impl ClassifyFailure for anyhow::Error {
    fn failure_kind(&self) -> FailureKind {
        if self.chain().any(cause_is_connectivity) {
            FailureKind::Connectivity
        } else {
            FailureKind::Fatal
        }
    }
}

impl ClassifyFailure for Box<dyn StdError + Send + Sync> {
    fn failure_kind(&self) -> FailureKind {
        let mut current: Option<&(dyn StdError + 'static)> = Some(self.as_ref());
        while let Some(err) = current {
            if cause_is_connectivity(err) {
                return FailureKind::Connectivity;
            }
            current = err.source();
        }
        FailureKind::Fatal
    }
}

/// Classify a single link of an error chain by downcasting to the types the
/// controller recognises.
fn cause_is_connectivity(err: &(dyn StdError + 'static)) -> bool {
    if err.is::<io::Error>() || err.is::<Elapsed>() {
        return true;
    }
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return e.failure_kind().is_connectivity();
    }
    if let Some(e) = err.downcast_ref::<NetRetryError>() {
        return e.failure_kind().is_connectivity();
    }
    false
}
