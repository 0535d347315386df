//! Request coalescing and batching.
//!
//! # Data Flow
//! ```text
//! request(ids, params)
//!     → keys.rs (context key)
//!     → cache lookup (hits answered directly)
//!     → context.rs (coalesce onto waiters or register as pending)
//!     → manager.rs (flush on limit / window / immediately)
//!     → resolver → parser.rs → cache write → waiter.rs fan-out
//! ```

pub mod context;
pub mod keys;
pub mod manager;
pub mod parser;
pub mod waiter;

pub use context::{Batch, RequestContext};
pub use keys::{context_key, record_key, Params};
pub use manager::{BatchManager, BufferStats};
pub use parser::{BasicParser, Parsed, ResponseParser};
pub use waiter::{Outcome, Waiter, WaiterHandle};
