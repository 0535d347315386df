//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → StoreConfig (validated, immutable)
//!     → shared via Arc by the store, batch manager and breaker
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a store is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BatchConfig, BreakerConfig, CacheConfig, CurveConfig, LogFormat, ObservabilityConfig,
    StoreConfig,
};
pub use validation::{validate_config, ValidationError};
