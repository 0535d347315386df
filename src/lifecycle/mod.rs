//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! HaStore::build → spawn cache sweeper (subscribed to Shutdown)
//! HaStore::shutdown or last handle dropped → Shutdown::trigger → sweeper exits
//! ```
//!
//! # Design Decisions
//! - In-flight batches are not cancelled by shutdown; they settle their waiters

pub mod shutdown;

pub use shutdown::Shutdown;
