//! Circuit breaker for resolver protection.
//!
//! # States
//! - Closed: normal operation, dispatches reach the resolver
//! - Open: resolver assumed down, dispatches fail fast
//!
//! # State Transitions
//! ```text
//! Closed → Closed: violation < tolerance (violation forgotten after tolerance_frame)
//! Closed → Open:   violations >= tolerance
//! Open → Closed:   open window elapsed (restore, keeps the break count)
//! Open → Closed:   success observed (close, resets the break count)
//! ```
//!
//! # Design Decisions
//! - One breaker per store (not per context): a failing resolver sheds load for all
//! - The open window grows along a curve with every consecutive trip
//! - Fail fast in Open state (no waiting for timeout)
//! - A disabled breaker accepts every call and never changes state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::BreakerConfig;
use crate::events::{EventBus, StoreEvent};
use crate::observability::metrics;
use crate::resilience::curve::Curve;

/// Snapshot of the breaker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    /// True while the circuit is open.
    pub active: bool,
    /// Consecutive trips since the last observed success.
    pub step: u32,
    /// Live violation count.
    pub violations: u32,
    /// Length of the current open window.
    pub ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct BreakerState {
    open: bool,
    consecutive_breaks: u32,
    violations: u32,
    ttl: Option<Duration>,
    /// Bumped on every trip so stale timers can tell they are outdated.
    generation: u64,
    recovery: Option<JoinHandle<()>>,
}

impl BreakerState {
    fn status(&self) -> BreakerStatus {
        BreakerStatus {
            active: self.open,
            step: self.consecutive_breaks,
            violations: self.violations,
            ttl: self.ttl,
        }
    }
}

/// Failure-tolerance state machine gating dispatches.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: Option<BreakerSettings>,
    state: Mutex<BreakerState>,
    events: EventBus,
}

#[derive(Debug)]
struct BreakerSettings {
    curve: Curve,
    tolerance: u32,
    tolerance_frame: Duration,
}

impl CircuitBreaker {
    /// Create a breaker. `None` builds a disabled breaker.
    pub fn new(config: Option<&BreakerConfig>, events: EventBus) -> Arc<Self> {
        let config = config.map(|c| BreakerSettings {
            curve: c.to_curve(),
            tolerance: c.tolerance.max(1),
            tolerance_frame: c.tolerance_frame(),
        });

        Arc::new(Self {
            config,
            state: Mutex::new(BreakerState::default()),
            events,
        })
    }

    pub fn disabled(events: EventBus) -> Arc<Self> {
        Self::new(None, events)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while dispatches must be rejected.
    pub fn is_open(&self) -> bool {
        self.config.is_some() && self.lock().open
    }

    pub fn status(&self) -> BreakerStatus {
        if self.config.is_none() {
            return BreakerStatus {
                active: false,
                step: 0,
                violations: 0,
                ttl: None,
            };
        }
        self.lock().status()
    }

    /// Record a violation, tripping the circuit once tolerance is reached.
    pub fn open_circuit(self: &Arc<Self>) {
        let Some(settings) = &self.config else {
            return;
        };

        let mut state = self.lock();
        if state.open {
            return;
        }

        state.violations += 1;
        if state.violations < settings.tolerance {
            let generation = state.generation;
            tracing::debug!(
                violations = state.violations,
                tolerance = settings.tolerance,
                "Breaker violation recorded"
            );
            drop(state);
            self.schedule_decay(generation, settings.tolerance_frame);
            return;
        }

        let ttl = settings.curve.at(state.consecutive_breaks);
        state.consecutive_breaks = (state.consecutive_breaks + 1).min(settings.curve.steps());
        state.violations = 0;
        state.open = true;
        state.ttl = Some(ttl);
        state.generation += 1;

        let generation = state.generation;
        let breaker = Arc::clone(self);
        state.recovery = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            breaker.restore_generation(generation);
        }));
        let status = state.status();
        drop(state);

        tracing::warn!(ttl = ?ttl, step = status.step, "Circuit broken");
        metrics::record_circuit_state(true);
        self.events.emit(StoreEvent::CircuitBroken(status));
    }

    fn schedule_decay(self: &Arc<Self>, generation: u64, frame: Duration) {
        let breaker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(frame).await;
            let mut state = breaker.lock();
            if state.generation == generation && !state.open {
                state.violations = state.violations.saturating_sub(1);
            }
        });
    }

    fn restore_generation(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || !state.open {
            return;
        }
        state.recovery = None;
        self.finish_restore(state);
    }

    /// Close an open circuit, keeping the break count for the next trip.
    pub fn restore_circuit(&self) {
        if self.config.is_none() {
            return;
        }
        let mut state = self.lock();
        if !state.open {
            return;
        }
        if let Some(handle) = state.recovery.take() {
            handle.abort();
        }
        self.finish_restore(state);
    }

    fn finish_restore(&self, mut state: MutexGuard<'_, BreakerState>) {
        state.open = false;
        state.ttl = None;
        let status = state.status();
        drop(state);

        tracing::info!(step = status.step, "Circuit restored");
        metrics::record_circuit_state(false);
        self.events.emit(StoreEvent::CircuitRestored(status));
    }

    /// Record an observed success: close the circuit and reset the break count.
    pub fn close_circuit(&self) {
        if self.config.is_none() {
            return;
        }
        let mut state = self.lock();
        let was_open = state.open;
        state.open = false;
        state.ttl = None;
        state.consecutive_breaks = 0;
        if let Some(handle) = state.recovery.take() {
            handle.abort();
        }
        let status = state.status();
        drop(state);

        if was_open {
            tracing::info!("Circuit recovered");
            metrics::record_circuit_state(false);
            self.events.emit(StoreEvent::CircuitRecovered(status));
        }
    }
}
