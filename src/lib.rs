//! Request deduplication, batching and tiered caching in front of a slow
//! data source.
//!
//! # Architecture Overview
//!
//! ```text
//!   get / get_many ──▶ ┌──────────────┐ hit ──────────────────────────▶ caller
//!                      │ tiered cache │
//!                      └──────┬───────┘
//!                             │ miss
//!                             ▼
//!                      ┌──────────────┐ coalesce onto in-flight waiter
//!                      │   context    │─────────────────────────────▶ caller
//!                      │   buffer     │
//!                      └──────┬───────┘
//!                             │ flush (limit / window / immediate)
//!                             ▼
//!                      ┌──────────────┐   ┌─────────┐   ┌──────────┐
//!                      │   breaker    │──▶│ timeout │──▶│ resolver │
//!                      └──────────────┘   └─────────┘   └────┬─────┘
//!                             ▲ retry with curve backoff     │
//!                             └──────────────────────────────┤
//!                                                            ▼
//!                                   parser ──▶ cache write ──▶ waiters
//! ```

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod resolver;
pub mod store;

pub use batch::{BasicParser, Outcome, Params, ResponseParser};
pub use cache::{CacheTier, ClearTarget};
pub use config::StoreConfig;
pub use error::{CacheTierError, ParseError, ResolverError, StoreError, StoreResult};
pub use events::StoreEvent;
pub use resolver::{resolver_fn, BatchMetadata, Resolver};
pub use store::{HaStore, HaStoreBuilder, StoreSize};
