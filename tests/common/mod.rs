//! Shared fixtures for integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use ha_store::{
    BatchMetadata, CacheTier, CacheTierError, ClearTarget, HaStore, Params, Resolver,
    ResolverError, StoreConfig,
};

/// One recorded resolver invocation.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct Call {
    pub ids: Vec<String>,
    pub params: Params,
    pub metadata: BatchMetadata,
}

/// Resolver that records every call and can be told to fail.
///
/// Answers with an array of `{"id", "language"}` records, echoing the
/// `language` param so tests can tell contexts apart.
#[derive(Default)]
pub struct MockResolver {
    calls: Mutex<Vec<Call>>,
    fail_first: AtomicU32,
    failing: AtomicBool,
    latency_ms: AtomicU64,
    omitted: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl MockResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        let resolver = Self::default();
        resolver
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
        Arc::new(resolver)
    }

    /// Fail the next `n` calls, then succeed.
    pub fn fail_first(&self, n: u32) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Leave `id` out of every response.
    pub fn omit(&self, id: &str) {
        self.omitted.lock().unwrap().insert(id.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_ids(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|call| call.ids).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(
        &self,
        ids: Vec<String>,
        params: Params,
        metadata: BatchMetadata,
    ) -> Result<Value, ResolverError> {
        self.calls.lock().unwrap().push(Call {
            ids: ids.clone(),
            params: params.clone(),
            metadata,
        });

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let scripted = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if scripted || self.failing.load(Ordering::SeqCst) {
            return Err(ResolverError::new("backend unavailable"));
        }

        let omitted = self.omitted.lock().unwrap().clone();
        let language = params.get("language").cloned().unwrap_or(Value::Null);
        Ok(Value::Array(
            ids.into_iter()
                .filter(|id| !omitted.contains(id))
                .map(|id| json!({"id": id, "language": language}))
                .collect(),
        ))
    }
}

/// In-memory stand-in for a remote cache tier.
#[derive(Default)]
pub struct MemoryTier {
    records: Mutex<HashMap<String, Value>>,
    failing: AtomicBool,
    gets: AtomicU32,
    latency_ms: AtomicU64,
}

#[allow(dead_code)]
impl MemoryTier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every lookup sleeps for `latency` before answering.
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        let tier = Self::default();
        tier.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
        Arc::new(tier)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.records.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get_count(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), CacheTierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheTierError::new("memory", "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheTierError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check()?;
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, entries: Vec<(String, Value)>) -> Result<(), CacheTierError> {
        self.check()?;
        self.records.lock().unwrap().extend(entries);
        Ok(())
    }

    async fn clear(&self, target: &ClearTarget) -> Result<(), CacheTierError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        match target {
            ClearTarget::All => records.clear(),
            ClearTarget::Key(key) => {
                records.remove(key);
            }
        }
        Ok(())
    }

    async fn size(&self) -> Result<usize, CacheTierError> {
        self.check()?;
        Ok(self.records.lock().unwrap().len())
    }
}

#[allow(dead_code)]
pub fn store(resolver: &Arc<MockResolver>, config: StoreConfig) -> HaStore {
    HaStore::builder_shared(resolver.clone())
        .config(config)
        .build()
        .unwrap()
}

#[allow(dead_code)]
pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[allow(dead_code)]
pub fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}
