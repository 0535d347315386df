//! Tiered caching subsystem.
//!
//! # Data Flow
//! ```text
//! lookup(context, ids)
//!     → local.rs (in-process, adaptive TTL)
//!     → tier.rs implementations (remote, in order, holes only)
//!     → aligned Vec<Option<Value>>
//! ```

pub mod local;
pub mod tier;
pub mod tiered;

pub use local::{LocalTier, RecordInfo, SweepReport};
pub use tier::{CacheTier, ClearTarget};
pub use tiered::{CacheSize, TieredCache};
