//! Timeout enforcement.
//!
//! # Responsibilities
//! - Run each resolver call in its own task
//! - Enforce the optional per-call timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities on the task handle, so an expired
//!   timeout fails the dispatch without cancelling the resolver call
//! - Timeout errors are distinct from other errors but retried the same way
//! - A panicking resolver is reported as a resolver failure

use std::future::Future;
use std::time::Duration;

use crate::error::{ResolverError, StoreError};

/// Drive `call` to completion, failing with [`StoreError::Timeout`] once
/// `timeout` elapses.
pub async fn run_with_timeout<T, F>(timeout: Option<Duration>, call: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    let handle = tokio::spawn(call);

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => return Err(StoreError::Timeout(limit)),
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|e| {
        Err(StoreError::Resolver(ResolverError::new(format!(
            "resolver task failed: {e}"
        ))))
    })
}
