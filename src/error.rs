//! Error types surfaced by the store.
//!
//! Every caller-visible error is `Clone`: one dispatch outcome is fanned out
//! to all coalesced waiters for an id.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResolverError {
    message: Arc<str>,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Arc::from(message.into()),
        }
    }

    /// Wrap any error, keeping its display text.
    pub fn from_error<E: std::error::Error>(err: E) -> Self {
        Self::new(err.to_string())
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The resolver answered with something the parser could not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected an array of records or an id-keyed object, got {0}")]
    UnexpectedShape(&'static str),

    #[error("{0}")]
    Custom(String),
}

/// A cache tier failed. Logged and counted, never returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cache tier `{tier}` failed: {message}")]
pub struct CacheTierError {
    pub tier: String,
    pub message: String,
}

impl CacheTierError {
    pub fn new(tier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tier: tier.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur while serving a request.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Dispatch refused without contacting the resolver.
    #[error("Service unavailable (circuit breaker open)")]
    CircuitOpen,

    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The per-call timeout elapsed before the resolver answered.
    #[error("Resolver timed out after {0:?}")]
    Timeout(Duration),

    /// The retry budget was spent; `last` is the final failure.
    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<StoreError>,
    },

    #[error("Cache error: {0}")]
    CacheTier(#[from] CacheTierError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The waiter's completion channel closed without an outcome.
    #[error("Request abandoned before completion")]
    Abandoned,
}

impl StoreError {
    /// The innermost error, looking through `RetryExhausted`.
    pub fn root_cause(&self) -> &StoreError {
        match self {
            StoreError::RetryExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// True for errors that represent a failed dispatch attempt.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Resolver(_) | StoreError::Parse(_) | StoreError::Timeout(_)
        )
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
