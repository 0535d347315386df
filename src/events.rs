//! Observability events.
//!
//! The store publishes a [`StoreEvent`] for every notable transition on a
//! broadcast channel. Subscribers that fall behind lose the oldest events;
//! publishing never blocks and succeeds with no subscribers.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::resilience::circuit_breaker::BreakerStatus;

const EVENT_CAPACITY: usize = 1024;

/// What triggered a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchCause {
    /// The pending id count reached the batch limit.
    Limit,
    /// The batch window elapsed.
    Timeout,
    /// Batching is disabled; dispatched once the call registered its ids.
    Immediate,
    /// A failed batch is being re-dispatched.
    Retry,
}

impl DispatchCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchCause::Limit => "limit",
            DispatchCause::Timeout => "timeout",
            DispatchCause::Immediate => "immediate",
            DispatchCause::Retry => "retry",
        }
    }
}

/// An event emitted by the store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StoreEvent {
    Query {
        cause: DispatchCause,
        key: String,
        uid: Uuid,
        ids: Vec<String>,
        attempt: u32,
    },
    QuerySuccess {
        key: String,
        uid: Uuid,
        size: usize,
    },
    QueryFailed {
        key: String,
        uid: Uuid,
        size: usize,
        attempt: u32,
        error: String,
    },
    RetryScheduled {
        key: String,
        uid: Uuid,
        attempt: u32,
        delay: Duration,
    },
    RetryCancelled {
        key: String,
        uid: Uuid,
        size: usize,
        attempts: u32,
        error: String,
    },
    CacheHit {
        key: String,
        found: usize,
    },
    CacheMiss {
        key: String,
        missing: usize,
    },
    CoalescedHit {
        key: String,
        found: usize,
    },
    CacheFull {
        key: String,
        limit: usize,
    },
    CacheBump {
        key: String,
        step: u32,
        expires_in: Duration,
    },
    CacheClear {
        key: String,
    },
    CircuitBroken(BreakerStatus),
    CircuitRestored(BreakerStatus),
    CircuitRecovered(BreakerStatus),
}

impl StoreEvent {
    /// Event name as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::Query { .. } => "query",
            StoreEvent::QuerySuccess { .. } => "querySuccess",
            StoreEvent::QueryFailed { .. } => "queryFailed",
            StoreEvent::RetryScheduled { .. } => "retryScheduled",
            StoreEvent::RetryCancelled { .. } => "retryCancelled",
            StoreEvent::CacheHit { .. } => "cacheHit",
            StoreEvent::CacheMiss { .. } => "cacheMiss",
            StoreEvent::CoalescedHit { .. } => "coalescedHit",
            StoreEvent::CacheFull { .. } => "cacheFull",
            StoreEvent::CacheBump { .. } => "cacheBump",
            StoreEvent::CacheClear { .. } => "cacheClear",
            StoreEvent::CircuitBroken(_) => "circuitBroken",
            StoreEvent::CircuitRestored(_) => "circuitRestored",
            StoreEvent::CircuitRecovered(_) => "circuitRecovered",
        }
    }
}

/// Fan-out channel for [`StoreEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        tracing::trace!(event = event.name(), "store event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
