//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! batch manager, cache tiers, breaker
//!     → logging.rs (tracing subscriber; fields: key, uid, size, attempt)
//!     → metrics.rs (ha_store_* counters, gauges, histograms)
//!     → crate::events (StoreEvent broadcast for in-process listeners)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape, when the exporter is installed
//! ```
//!
//! # Design Decisions
//! - Batch uid is attached to every per-dispatch log line and event
//! - Recording goes through the `metrics` facade; without an exporter it is a no-op

pub mod logging;
pub mod metrics;
