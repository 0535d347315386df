//! Context and batch lifecycle.
//!
//! # Responsibilities
//! - Route each requested id to its context and coalesce duplicates
//! - Buffer ids for the batch window, flush on limit or timer
//! - Dispatch batches through the breaker, timeout and retry policy
//! - Write results to the cache, then wake every waiter
//!
//! # Design Decisions
//! - Register, coalesce and flush happen under one context-table entry
//!   guard, so an id is either pending, in flight or settled, never two at once
//! - A batch owns its retry step; re-dispatches reuse the same id set and tags
//! - Waiters are released from their context before being woken, and the
//!   cache is written before either, so a caller woken by a success always
//!   finds the value cached
//! - Only terminal failures count as breaker violations

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::batch::context::{Batch, RequestContext};
use crate::batch::keys::{context_key, Params};
use crate::batch::parser::{Parsed, ResponseParser};
use crate::batch::waiter::{Outcome, WaiterHandle};
use crate::cache::TieredCache;
use crate::config::{BatchConfig, StoreConfig};
use crate::error::StoreError;
use crate::events::{DispatchCause, EventBus, StoreEvent};
use crate::observability::metrics;
use crate::resilience::{run_with_timeout, CircuitBreaker, RetryDecision, RetryPolicy};
use crate::resolver::Resolver;

/// Buffer counts reported by `size()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// Contexts with ids waiting for their batch window.
    pub pending: usize,
    /// Batches dispatched and not yet settled, including those waiting to retry.
    pub active: usize,
}

pub struct BatchManager {
    contexts: DashMap<String, RequestContext>,
    delimiter: Vec<String>,
    batch: Option<BatchConfig>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    cache: Arc<TieredCache>,
    breaker: Arc<CircuitBreaker>,
    resolver: Arc<dyn Resolver>,
    parser: Arc<dyn ResponseParser>,
    events: EventBus,
    active: AtomicUsize,
}

impl BatchManager {
    pub fn new(
        config: &StoreConfig,
        cache: Arc<TieredCache>,
        breaker: Arc<CircuitBreaker>,
        resolver: Arc<dyn Resolver>,
        parser: Arc<dyn ResponseParser>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            contexts: DashMap::new(),
            delimiter: config.delimiter.clone(),
            batch: config.active_batch().cloned(),
            timeout: config.timeout(),
            retry: RetryPolicy::new(config.retry.as_ref()),
            cache,
            breaker,
            resolver,
            parser,
            events,
            active: AtomicUsize::new(0),
        })
    }

    pub fn context_key(&self, params: &Params) -> String {
        context_key(&self.delimiter, params)
    }

    /// Resolve `ids` under `params`. The outcomes are aligned with `ids`.
    pub async fn request(
        self: &Arc<Self>,
        ids: &[String],
        params: &Params,
        tag: Option<&Value>,
    ) -> Vec<Outcome> {
        let key = self.context_key(params);
        let cached = self.cache.get_multi(&key, ids).await;

        let mut outcomes: Vec<Option<Outcome>> = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for (index, value) in cached.into_iter().enumerate() {
            match value {
                Some(value) => outcomes.push(Some(Ok(Some(value)))),
                None => {
                    outcomes.push(None);
                    missing.push(index);
                }
            }
        }

        let found = ids.len() - missing.len();
        if found > 0 {
            metrics::record_cache_lookup("hit", found);
            self.events.emit(StoreEvent::CacheHit {
                key: key.clone(),
                found,
            });
        }
        if missing.is_empty() {
            return outcomes.into_iter().flatten().collect();
        }

        let wanted: Vec<&str> = missing.iter().map(|&i| ids[i].as_str()).collect();
        let handles = self.register(&key, params, &wanted, tag);
        let results = join_all(handles.into_iter().map(WaiterHandle::wait)).await;
        for (index, result) in missing.into_iter().zip(results) {
            outcomes[index] = Some(result);
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.unwrap_or(Err(StoreError::Abandoned)))
            .collect()
    }

    fn register(
        self: &Arc<Self>,
        key: &str,
        params: &Params,
        ids: &[&str],
        tag: Option<&Value>,
    ) -> Vec<WaiterHandle> {
        let mut handles = Vec::with_capacity(ids.len());
        let mut coalesced = 0;
        let mut fresh = 0;

        {
            let mut entry = self
                .contexts
                .entry(key.to_string())
                .or_insert_with(|| RequestContext::new(params.clone()));
            let ctx = entry.value_mut();

            for id in ids {
                if let Some(handle) = ctx.coalesce(id, tag) {
                    coalesced += 1;
                    handles.push(handle);
                    continue;
                }

                fresh += 1;
                handles.push(ctx.register(id, tag));
                if let Some(batch) = &self.batch {
                    if ctx.pending_len() >= batch.limit {
                        self.flush_context(key, ctx, DispatchCause::Limit);
                    }
                }
            }

            if ctx.has_pending() {
                match &self.batch {
                    None => self.flush_context(key, ctx, DispatchCause::Immediate),
                    Some(batch) if !ctx.has_timer() => {
                        let window = ctx.open_window();
                        let handle = self.start_timer(key, window, batch.delay());
                        ctx.arm_timer(window, handle);
                    }
                    Some(_) => {}
                }
            }
        }

        if coalesced > 0 {
            metrics::record_cache_lookup("coalesced", coalesced);
            self.events.emit(StoreEvent::CoalescedHit {
                key: key.to_string(),
                found: coalesced,
            });
        }
        if fresh > 0 {
            metrics::record_cache_lookup("miss", fresh);
            self.events.emit(StoreEvent::CacheMiss {
                key: key.to_string(),
                missing: fresh,
            });
        }

        handles
    }

    fn start_timer(
        self: &Arc<Self>,
        key: &str,
        window: u64,
        delay: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.flush_window(&key, window);
        })
    }

    fn flush_window(self: &Arc<Self>, key: &str, window: u64) {
        let Some(mut entry) = self.contexts.get_mut(key) else {
            return;
        };
        let ctx = entry.value_mut();
        if ctx.close_window(window) {
            self.flush_context(key, ctx, DispatchCause::Timeout);
        }
    }

    /// Snapshot the pending ids of `ctx` and dispatch them. The caller holds
    /// the context's entry guard.
    fn flush_context(self: &Arc<Self>, key: &str, ctx: &mut RequestContext, cause: DispatchCause) {
        ctx.cancel_timer();
        let chunk = self.batch.as_ref().map_or(usize::MAX, |b| b.limit);

        for batch in ctx.take_batches(key, chunk) {
            tracing::debug!(
                key = %batch.key,
                uid = %batch.uid,
                size = batch.ids.len(),
                cause = cause.as_str(),
                "Flushing batch"
            );
            self.active.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(Arc::clone(self).run(batch, cause));
        }
    }

    async fn run(self: Arc<Self>, mut batch: Batch, mut cause: DispatchCause) {
        loop {
            if self.breaker.is_open() {
                tracing::debug!(key = %batch.key, uid = %batch.uid, "Circuit open, rejecting batch");
                self.settle(&batch, |_| Err(StoreError::CircuitOpen));
                break;
            }

            let attempt = batch.retry_step + 1;
            metrics::record_query(cause.as_str());
            self.events.emit(StoreEvent::Query {
                cause,
                key: batch.key.clone(),
                uid: batch.uid,
                ids: batch.ids.clone(),
                attempt,
            });

            let start = Instant::now();
            match self.dispatch(&batch).await {
                Ok(values) => {
                    metrics::record_query_result(true, start);
                    tracing::debug!(
                        key = %batch.key,
                        uid = %batch.uid,
                        size = batch.ids.len(),
                        found = values.len(),
                        attempt,
                        "Batch resolved"
                    );
                    self.events.emit(StoreEvent::QuerySuccess {
                        key: batch.key.clone(),
                        uid: batch.uid,
                        size: batch.ids.len(),
                    });

                    self.cache.set(&batch.key, &batch.ids, &values);
                    self.breaker.close_circuit();
                    self.settle(&batch, |id| {
                        Ok(values.get(id).filter(|value| !value.is_null()).cloned())
                    });
                    break;
                }
                Err(error) => {
                    metrics::record_query_result(false, start);
                    batch.retry_step += 1;
                    self.events.emit(StoreEvent::QueryFailed {
                        key: batch.key.clone(),
                        uid: batch.uid,
                        size: batch.ids.len(),
                        attempt,
                        error: error.to_string(),
                    });

                    match self.retry.decide(batch.retry_step) {
                        RetryDecision::Retry { delay } => {
                            tracing::warn!(
                                key = %batch.key,
                                uid = %batch.uid,
                                attempt,
                                delay = ?delay,
                                error = %error,
                                "Batch failed, retrying"
                            );
                            self.events.emit(StoreEvent::RetryScheduled {
                                key: batch.key.clone(),
                                uid: batch.uid,
                                attempt: attempt + 1,
                                delay,
                            });
                            tokio::time::sleep(delay).await;
                            cause = DispatchCause::Retry;
                        }
                        RetryDecision::GiveUp { attempts } => {
                            tracing::error!(
                                key = %batch.key,
                                uid = %batch.uid,
                                size = batch.ids.len(),
                                attempts,
                                error = %error,
                                "Batch failed, giving up"
                            );
                            self.events.emit(StoreEvent::RetryCancelled {
                                key: batch.key.clone(),
                                uid: batch.uid,
                                size: batch.ids.len(),
                                attempts,
                                error: error.to_string(),
                            });

                            self.breaker.open_circuit();
                            let failure = StoreError::RetryExhausted {
                                attempts,
                                last: Box::new(error),
                            };
                            self.settle(&batch, |_| Err(failure.clone()));
                            break;
                        }
                    }
                }
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    async fn dispatch(&self, batch: &Batch) -> Result<Parsed, StoreError> {
        let resolver = Arc::clone(&self.resolver);
        let ids = batch.ids.clone();
        let params = batch.params.clone();
        let metadata = batch.metadata.clone();

        let raw = run_with_timeout(self.timeout, async move {
            resolver
                .resolve(ids, params, metadata)
                .await
                .map_err(StoreError::from)
        })
        .await?;

        Ok(self.parser.parse(raw, &batch.ids, &batch.params)?)
    }

    /// Release the batch's waiters from their context, then wake them.
    fn settle(&self, batch: &Batch, outcome: impl Fn(&str) -> Outcome) {
        if let Some(mut ctx) = self.contexts.get_mut(&batch.key) {
            for (id, waiter) in batch.ids.iter().zip(&batch.waiters) {
                ctx.release(id, waiter);
            }
        }

        for (id, waiter) in batch.ids.iter().zip(&batch.waiters) {
            waiter.complete(outcome(id));
        }

        self.contexts.remove_if(&batch.key, |_, ctx| ctx.is_idle());
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            pending: self.contexts.iter().filter(|ctx| ctx.has_pending()).count(),
            active: self.active.load(Ordering::SeqCst),
        }
    }

    /// Number of live contexts.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }
}

/// Group per-id outcomes by id, keeping the first outcome of repeated ids.
pub fn outcomes_by_id(ids: &[String], outcomes: Vec<Outcome>) -> HashMap<String, Outcome> {
    let mut by_id = HashMap::with_capacity(ids.len());
    for (id, outcome) in ids.iter().zip(outcomes) {
        by_id.entry(id.clone()).or_insert(outcome);
    }
    by_id
}
