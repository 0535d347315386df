//! Ordered cache tiers: one optional local tier, then remote tiers.
//!
//! Lookups try the local tier, then ask every remote tier for the remaining
//! holes concurrently; the first tier in order with a value wins. Remote tiers are best effort: their
//! failures are logged and counted, and a failing tier reads as all-absent.
//! Remote writes run in the background so a slow tier never delays
//! waiters. Remote hits are not copied into the local tier.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::batch::keys::record_key;
use crate::cache::local::LocalTier;
use crate::cache::tier::{CacheTier, ClearTarget};
use crate::observability::metrics;

/// Record counts per tier kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheSize {
    pub local: usize,
    /// Sum over all remote tiers that answered.
    pub remote: usize,
}

/// The cache as seen by the batch manager.
pub struct TieredCache {
    enabled: bool,
    local: Option<Arc<LocalTier>>,
    remotes: Vec<Arc<dyn CacheTier>>,
}

impl TieredCache {
    pub fn new(local: Option<Arc<LocalTier>>, remotes: Vec<Arc<dyn CacheTier>>) -> Self {
        Self {
            enabled: true,
            local,
            remotes,
        }
    }

    /// A cache that stores nothing and misses every lookup.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            local: None,
            remotes: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn local(&self) -> Option<&Arc<LocalTier>> {
        self.local.as_ref()
    }

    /// Look up ids in one context. The result is aligned with `ids`.
    pub async fn get_multi(&self, context_key: &str, ids: &[String]) -> Vec<Option<Value>> {
        if !self.enabled || ids.is_empty() {
            return vec![None; ids.len()];
        }

        let keys: Vec<String> = ids.iter().map(|id| record_key(context_key, id)).collect();
        let mut found = match &self.local {
            Some(local) => local.get_multi(&keys),
            None => vec![None; keys.len()],
        };

        let holes: Vec<usize> = (0..found.len()).filter(|&i| found[i].is_none()).collect();
        if holes.is_empty() || self.remotes.is_empty() {
            return found;
        }
        let wanted: Vec<String> = holes.iter().map(|&i| keys[i].clone()).collect();

        // Every remote is asked for the same holes; earlier tiers win.
        let replies = join_all(self.remotes.iter().map(|tier| tier.get_multi(&wanted))).await;
        for (tier, reply) in self.remotes.iter().zip(replies) {
            match reply {
                Ok(values) if values.len() == wanted.len() => {
                    for (&slot, value) in holes.iter().zip(values) {
                        if found[slot].is_none() {
                            found[slot] = value;
                        }
                    }
                }
                Ok(values) => {
                    tracing::warn!(
                        tier = tier.name(),
                        expected = wanted.len(),
                        got = values.len(),
                        "Cache tier returned a misaligned lookup, ignoring"
                    );
                    metrics::record_tier_error("get");
                }
                Err(e) => {
                    tracing::warn!(tier = tier.name(), error = %e, "Cache tier lookup failed");
                    metrics::record_tier_error("get");
                }
            }
        }

        found
    }

    pub async fn get(&self, context_key: &str, id: &str) -> Option<Value> {
        self.get_multi(context_key, &[id.to_string()])
            .await
            .into_iter()
            .next()
            .flatten()
    }

    /// Write the found values for `ids`. Ids without a value are not cached.
    pub fn set(&self, context_key: &str, ids: &[String], values: &HashMap<String, Value>) {
        if !self.enabled {
            return;
        }

        let entries: Vec<(String, Value)> = ids
            .iter()
            .filter_map(|id| {
                values
                    .get(id)
                    .filter(|value| !value.is_null())
                    .map(|value| (record_key(context_key, id), value.clone()))
            })
            .collect();
        if entries.is_empty() {
            return;
        }

        for tier in &self.remotes {
            let tier = Arc::clone(tier);
            let entries = entries.clone();
            tokio::spawn(async move {
                if let Err(e) = tier.set(entries).await {
                    tracing::warn!(tier = tier.name(), error = %e, "Cache tier write failed");
                    metrics::record_tier_error("set");
                }
            });
        }

        if let Some(local) = &self.local {
            local.set_many(entries);
        }
    }

    /// Remove records from every tier.
    pub async fn clear(&self, targets: &[ClearTarget]) {
        if !self.enabled {
            return;
        }

        if let Some(local) = &self.local {
            for target in targets {
                local.clear(target);
            }
        }

        let clears = self.remotes.iter().map(|tier| async move {
            for target in targets {
                if let Err(e) = tier.clear(target).await {
                    tracing::warn!(tier = tier.name(), error = %e, "Cache tier clear failed");
                    metrics::record_tier_error("clear");
                }
            }
        });
        join_all(clears).await;
    }

    pub async fn size(&self) -> CacheSize {
        let local = self.local.as_ref().map_or(0, |l| l.len());

        let sizes = join_all(self.remotes.iter().map(|tier| tier.size())).await;
        let mut remote = 0;
        for (tier, size) in self.remotes.iter().zip(sizes) {
            match size {
                Ok(count) => remote += count,
                Err(e) => {
                    tracing::warn!(tier = tier.name(), error = %e, "Cache tier size failed");
                    metrics::record_tier_error("size");
                }
            }
        }

        CacheSize { local, remote }
    }
}
