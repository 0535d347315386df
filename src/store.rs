//! The public store engine.
//!
//! [`HaStore`] ties the cache, batch manager and breaker together behind a
//! cloneable handle. Background tasks stop when the last handle is dropped
//! or [`HaStore::shutdown`] is called.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::batch::manager::outcomes_by_id;
use crate::batch::{
    record_key, BasicParser, BatchManager, BufferStats, Outcome, Params, ResponseParser,
};
use crate::cache::{CacheSize, CacheTier, ClearTarget, LocalTier, TieredCache};
use crate::config::{validate_config, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::events::{EventBus, StoreEvent};
use crate::lifecycle::Shutdown;
use crate::resilience::{BreakerStatus, CircuitBreaker};
use crate::resolver::Resolver;

/// Buffer and record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSize {
    pub buffers: BufferStats,
    pub records: CacheSize,
}

struct StoreInner {
    config: StoreConfig,
    manager: Arc<BatchManager>,
    cache: Arc<TieredCache>,
    breaker: Arc<CircuitBreaker>,
    parser: Arc<dyn ResponseParser>,
    events: EventBus,
    shutdown: Shutdown,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Request-deduplicating, batching, caching front for a [`Resolver`].
#[derive(Clone)]
pub struct HaStore {
    inner: Arc<StoreInner>,
}

/// Builder for [`HaStore`].
pub struct HaStoreBuilder {
    resolver: Arc<dyn Resolver>,
    config: StoreConfig,
    remotes: Vec<Arc<dyn CacheTier>>,
    parser: Arc<dyn ResponseParser>,
}

impl HaStoreBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a remote tier, queried after the local tier in insertion order.
    pub fn remote_tier(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.remotes.push(tier);
        self
    }

    /// Replace the default response parser.
    pub fn parser<P: ResponseParser + 'static>(mut self, parser: P) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Validate the configuration and start the store.
    ///
    /// Must be called from within a Tokio runtime: the cache sweeper is
    /// spawned here.
    pub fn build(self) -> StoreResult<HaStore> {
        validate_config(&self.config).map_err(|errors| {
            StoreError::Config(
                errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        tokio::runtime::Handle::try_current()
            .map_err(|_| StoreError::Config("store must be built inside a Tokio runtime".into()))?;

        let events = EventBus::new();
        let shutdown = Shutdown::new();

        let cache = match self.config.active_cache() {
            Some(cache_config) => {
                let local = cache_config.local.then(|| {
                    let local = Arc::new(LocalTier::new(cache_config, events.clone()));
                    tokio::spawn(Arc::clone(&local).run_sweeper(shutdown.subscribe()));
                    local
                });
                Arc::new(TieredCache::new(local, self.remotes))
            }
            None => Arc::new(TieredCache::disabled()),
        };
        let breaker = CircuitBreaker::new(self.config.breaker.as_ref(), events.clone());
        let manager = BatchManager::new(
            &self.config,
            Arc::clone(&cache),
            Arc::clone(&breaker),
            self.resolver,
            Arc::clone(&self.parser),
            events.clone(),
        );

        tracing::info!(
            delimiter = ?self.config.delimiter,
            cache = cache.is_enabled(),
            batch = self.config.active_batch().is_some(),
            retry = self.config.retry.is_some(),
            breaker = breaker.is_enabled(),
            "Store started"
        );

        Ok(HaStore {
            inner: Arc::new(StoreInner {
                config: self.config,
                manager,
                cache,
                breaker,
                parser: self.parser,
                events,
                shutdown,
            }),
        })
    }
}

impl HaStore {
    pub fn builder<R: Resolver>(resolver: R) -> HaStoreBuilder {
        Self::builder_shared(Arc::new(resolver))
    }

    pub fn builder_shared(resolver: Arc<dyn Resolver>) -> HaStoreBuilder {
        HaStoreBuilder {
            resolver,
            config: StoreConfig::default(),
            remotes: Vec::new(),
            parser: Arc::new(BasicParser),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Fetch one id. `Ok(None)` means the resolver did not return it.
    pub async fn get(
        &self,
        id: impl Into<String>,
        params: &Params,
        tag: Option<Value>,
    ) -> StoreResult<Option<Value>> {
        let ids = vec![id.into()];
        self.inner
            .manager
            .request(&ids, params, tag.as_ref())
            .await
            .into_iter()
            .next()
            .unwrap_or(Err(StoreError::Abandoned))
    }

    /// Fetch several ids. Every id gets its own outcome; the call as a whole
    /// never fails.
    pub async fn get_many<I, S>(
        &self,
        ids: I,
        params: &Params,
        tag: Option<Value>,
    ) -> HashMap<String, Outcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let outcomes = self.inner.manager.request(&ids, params, tag.as_ref()).await;
        outcomes_by_id(&ids, outcomes)
    }

    /// Write values into the cache as if a resolver had returned `items`.
    pub fn set(&self, items: Value, ids: &[String], params: &Params) -> StoreResult<()> {
        if ids.is_empty() {
            return Err(StoreError::InvalidArgument(
                "set requires at least one id".into(),
            ));
        }
        if !self.inner.cache.is_enabled() {
            return Ok(());
        }

        let values = self.inner.parser.parse(items, ids, params)?;
        let key = self.inner.manager.context_key(params);
        self.inner.cache.set(&key, ids, &values);
        Ok(())
    }

    /// Remove cached records for `ids` in the context of `params`.
    pub async fn clear(&self, ids: &[String], params: &Params) {
        let key = self.inner.manager.context_key(params);
        let targets: Vec<ClearTarget> = ids
            .iter()
            .map(|id| ClearTarget::Key(record_key(&key, id)))
            .collect();
        self.inner.cache.clear(&targets).await;
    }

    /// Remove every cached record.
    pub async fn clear_all(&self) {
        self.inner.cache.clear(&[ClearTarget::All]).await;
    }

    pub async fn size(&self) -> StoreSize {
        StoreSize {
            buffers: self.inner.manager.stats(),
            records: self.inner.cache.size().await,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.inner.breaker.status()
    }

    /// Stop background tasks. In-flight batches still settle.
    pub fn shutdown(&self) {
        self.inner.shutdown.trigger();
    }
}
