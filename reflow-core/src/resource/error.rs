//! Resource Error Taxonomy
//!
//! Errors surfaced by fetchers fall into four kinds. Network and timeout
//! failures are transient and retryable by default; aborts are discarded
//! silently and never surfaced to a subscriber; terminal failures (a
//! malformed request, say) surface immediately with no retry.
//!
//! The classification is a caller-supplied predicate so a transport layer
//! can refine it, e.g. treating an HTTP 503 as retryable and a 400 as
//! terminal.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// An error produced by a fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Transport-level failure. Retryable by default.
    #[error("network error: {0}")]
    Network(String),

    /// The fetch did not complete in time. Retryable by default.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The fetch was cancelled. Never surfaced to subscribers.
    #[error("fetch aborted")]
    Aborted,

    /// Caller or request error that retrying cannot fix.
    #[error("{0}")]
    Terminal(String),
}

/// Whether a failed fetch should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Terminal,
}

impl ResourceError {
    /// The default classification: network and timeout failures retry,
    /// everything else stops.
    pub fn default_class(&self) -> RetryClass {
        match self {
            ResourceError::Network(_) | ResourceError::Timeout(_) => RetryClass::Retryable,
            ResourceError::Aborted | ResourceError::Terminal(_) => RetryClass::Terminal,
        }
    }
}

/// Caller-supplied predicate mapping an error to its retry class.
pub type ErrorClassifier = Arc<dyn Fn(&ResourceError) -> RetryClass + Send + Sync>;

/// The default classifier, delegating to [`ResourceError::default_class`].
pub(crate) fn default_classifier() -> ErrorClassifier {
    Arc::new(|err| err.default_class())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
