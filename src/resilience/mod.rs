//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch to resolver:
//!     → circuit_breaker.rs (fail fast while open)
//!     → timeouts.rs (enforce per-call timeout)
//!     → On failure: retries.rs (re-dispatch with curve backoff)
//!     → Budget spent: circuit_breaker.rs (record violation, trip at tolerance)
//! ```
//!
//! # Design Decisions
//! - curve.rs is the single source of every delay (retry, breaker window, cache TTL)
//! - Breaker state is per store instance, never global
//! - Timeouts never cancel the resolver call itself

pub mod circuit_breaker;
pub mod curve;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerStatus, CircuitBreaker};
pub use curve::{Curve, CurveShape};
pub use retries::{RetryDecision, RetryPolicy};
pub use timeouts::run_with_timeout;
