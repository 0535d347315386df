//! Cache tier contract.
//!
//! Remote tiers (Redis, memcached, another process) are reached only through
//! [`CacheTier`]. Keys are full record keys (`context::id`); the tiered cache
//! builds them before calling a tier.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;

use crate::error::CacheTierError;

/// What to remove from a tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    /// Every record.
    All,
    /// A single record key.
    Key(String),
}

/// A cache tier, usually network-backed.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Tier name for logs.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheTierError>;

    /// Look up several keys. The result must be aligned with `keys`.
    async fn get_multi(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheTierError> {
        join_all(keys.iter().map(|key| self.get(key)))
            .await
            .into_iter()
            .collect()
    }

    async fn set(&self, entries: Vec<(String, Value)>) -> Result<(), CacheTierError>;

    async fn clear(&self, target: &ClearTarget) -> Result<(), CacheTierError>;

    /// Number of records held.
    async fn size(&self) -> Result<usize, CacheTierError>;
}
