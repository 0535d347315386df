//! In-process cache tier with adaptive expiration.
//!
//! Every record starts at step 0 with a TTL of `curve(0)`. Reads flag the
//! record; when it reaches its expiry a flagged record moves one step up the
//! curve and lives on, an unflagged one is evicted. A single sweeper task
//! walks the map on an interval. Reads also check expiry, so an overdue
//! record is never served between sweeps.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::cache::tier::ClearTarget;
use crate::config::CacheConfig;
use crate::events::{EventBus, StoreEvent};
use crate::observability::metrics;
use crate::resilience::curve::Curve;

#[derive(Debug, Clone)]
struct CacheRecord {
    value: Value,
    written_at: Instant,
    step: u32,
    expires_at: Instant,
    accessed_since_write: bool,
}

/// Read-only view of a record's expiry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    pub step: u32,
    pub age: Duration,
    pub expires_in: Duration,
}

/// Outcome of an expiration check on one record.
enum Expiry {
    Live,
    Bumped { step: u32, expires_in: Duration },
    Evicted,
}

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub bumped: usize,
    pub evicted: usize,
}

/// Bounded in-memory tier.
#[derive(Debug)]
pub struct LocalTier {
    records: DashMap<String, CacheRecord>,
    limit: usize,
    curve: Curve,
    sweep_interval: Duration,
    events: EventBus,
}

impl LocalTier {
    pub fn new(config: &CacheConfig, events: EventBus) -> Self {
        Self {
            records: DashMap::new(),
            limit: config.limit,
            curve: config.ttl.to_curve(),
            sweep_interval: Duration::from_millis(config.sweep_interval_ms.max(1)),
            events,
        }
    }

    fn check(&self, record: &mut CacheRecord, now: Instant) -> Expiry {
        if now < record.expires_at {
            return Expiry::Live;
        }
        if record.accessed_since_write && record.step < self.curve.steps() {
            record.step += 1;
            let ttl = self.curve.at(record.step);
            record.expires_at = now + ttl;
            record.accessed_since_write = false;
            return Expiry::Bumped {
                step: record.step,
                expires_in: ttl,
            };
        }
        Expiry::Evicted
    }

    fn report(&self, key: &str, expiry: &Expiry) {
        match expiry {
            Expiry::Live => {}
            Expiry::Bumped { step, expires_in } => self.events.emit(StoreEvent::CacheBump {
                key: key.to_string(),
                step: *step,
                expires_in: *expires_in,
            }),
            Expiry::Evicted => self.events.emit(StoreEvent::CacheClear {
                key: key.to_string(),
            }),
        }
    }

    /// Look up a record and flag it as accessed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let expiry = {
            let mut record = self.records.get_mut(key)?;
            let expiry = self.check(&mut record, now);
            if !matches!(expiry, Expiry::Evicted) {
                record.accessed_since_write = true;
                let value = record.value.clone();
                drop(record);
                self.report(key, &expiry);
                return Some(value);
            }
            expiry
        };

        if self
            .records
            .remove_if(key, |_, record| now >= record.expires_at)
            .is_some()
        {
            self.report(key, &expiry);
        }
        None
    }

    pub fn get_multi(&self, keys: &[String]) -> Vec<Option<Value>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Store a record at step 0. Returns false when the write was skipped
    /// because the tier is full.
    pub fn set(&self, key: String, value: Value) -> bool {
        if self.records.len() >= self.limit && !self.records.contains_key(&key) {
            tracing::debug!(key = %key, limit = self.limit, "Local cache full, skipping write");
            self.events.emit(StoreEvent::CacheFull {
                key,
                limit: self.limit,
            });
            return false;
        }

        let now = Instant::now();
        self.records.insert(
            key,
            CacheRecord {
                value,
                written_at: now,
                step: 0,
                expires_at: now + self.curve.at(0),
                accessed_since_write: false,
            },
        );
        true
    }

    pub fn set_many(&self, entries: Vec<(String, Value)>) {
        for (key, value) in entries {
            self.set(key, value);
        }
        metrics::record_local_records(self.records.len());
    }

    pub fn clear(&self, target: &ClearTarget) {
        match target {
            ClearTarget::All => self.records.clear(),
            ClearTarget::Key(key) => {
                self.records.remove(key);
            }
        }
        metrics::record_local_records(self.records.len());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_info(&self, key: &str) -> Option<RecordInfo> {
        let now = Instant::now();
        self.records.get(key).map(|record| RecordInfo {
            step: record.step,
            age: now.saturating_duration_since(record.written_at),
            expires_in: record.expires_at.saturating_duration_since(now),
        })
    }

    /// Run one expiration pass over every record.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut outcomes = Vec::new();
        self.records.retain(|key, record| match self.check(record, now) {
            Expiry::Live => true,
            expiry @ Expiry::Bumped { .. } => {
                outcomes.push((key.clone(), expiry));
                true
            }
            Expiry::Evicted => {
                outcomes.push((key.clone(), Expiry::Evicted));
                false
            }
        });

        let mut report = SweepReport::default();
        for (key, expiry) in &outcomes {
            match expiry {
                Expiry::Bumped { .. } => report.bumped += 1,
                Expiry::Evicted => report.evicted += 1,
                Expiry::Live => {}
            }
            self.report(key, expiry);
        }
        if report.evicted > 0 {
            metrics::record_local_records(self.records.len());
        }
        report
    }

    /// Sweep on an interval until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(interval = ?self.sweep_interval, "Cache sweeper starting");
        let mut ticker = time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep(Instant::now());
                    if report.evicted > 0 || report.bumped > 0 {
                        tracing::trace!(
                            bumped = report.bumped,
                            evicted = report.evicted,
                            "Cache sweep"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
