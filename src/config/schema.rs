//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the store.
//! All types derive Serde traits for deserialization from config files.
//! Every optional feature is an `Option`: `None` disables it. In a file,
//! `[cache]` and `[batch]` default to on and are switched off with
//! `enabled = false`, while `[retry]` and `[breaker]` are off unless present.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::curve::{Curve, CurveShape};

/// Root configuration for a store instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Ordered parameter names that split requests into separate contexts.
    pub delimiter: Vec<String>,

    /// Tiered cache settings. `None` or `enabled = false` disables caching.
    pub cache: Option<CacheConfig>,

    /// Batching window. `None` or `enabled = false` dispatches once per call.
    pub batch: Option<BatchConfig>,

    /// Retry backoff curve. `None` makes the first failure terminal.
    pub retry: Option<CurveConfig>,

    /// Circuit breaker. `None` turns the breaker into a no-op.
    pub breaker: Option<BreakerConfig>,

    /// Per-call resolver timeout in milliseconds.
    pub timeout_ms: Option<u64>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            delimiter: Vec::new(),
            cache: Some(CacheConfig::default()),
            batch: Some(BatchConfig::default()),
            retry: None,
            breaker: None,
            timeout_ms: None,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Per-call resolver timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Effective cache config, `None` when caching is off.
    pub fn active_cache(&self) -> Option<&CacheConfig> {
        self.cache.as_ref().filter(|c| c.enabled)
    }

    /// Effective batch config, `None` when batching is off.
    pub fn active_batch(&self) -> Option<&BatchConfig> {
        self.batch.as_ref().filter(|b| b.enabled)
    }
}

/// Generic step curve settings shared by retry, breaker and cache TTL.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CurveConfig {
    /// Duration at step 0, in milliseconds.
    pub base_ms: u64,

    /// Number of steps until the curve reaches its limit.
    pub steps: u32,

    /// Upper bound of the curve, in milliseconds.
    pub limit_ms: u64,

    /// Easing applied between base and limit.
    pub curve: CurveShape,
}

impl CurveConfig {
    fn retry_default() -> Self {
        Self {
            base_ms: 5,
            steps: 3,
            limit_ms: 5_000,
            curve: CurveShape::Quadratic,
        }
    }

    /// Build the runtime curve.
    pub fn to_curve(&self) -> Curve {
        Curve::new(
            Duration::from_millis(self.base_ms),
            self.steps,
            Duration::from_millis(self.limit_ms),
        )
        .with_shape(self.curve)
    }
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self::retry_default()
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching.
    pub enabled: bool,

    /// Keep an in-process tier in front of the remote tiers. With `false`
    /// only remote tiers are consulted and no sweeper runs.
    pub local: bool,

    /// Maximum number of records in the local tier.
    pub limit: usize,

    /// Adaptive TTL curve for local records.
    pub ttl: CurveConfig,

    /// How often the local tier checks records for expiration.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local: true,
            limit: 5_000,
            ttl: CurveConfig {
                base_ms: 300_000,
                steps: 5,
                limit_ms: 900_000,
                curve: CurveShape::Quadratic,
            },
            sweep_interval_ms: 1_000,
        }
    }
}

/// Batching configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Enable batching.
    pub enabled: bool,

    /// Batch window in milliseconds, started by the first pending id.
    pub delay_ms: u64,

    /// Pending id count that dispatches immediately, also the chunk size.
    pub limit: usize,
}

impl BatchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 50,
            limit: 100,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Open-window duration at the first trip, in milliseconds.
    pub base_ms: u64,

    /// Number of consecutive trips until the window reaches its limit.
    pub steps: u32,

    /// Longest open window, in milliseconds.
    pub limit_ms: u64,

    /// Easing applied between base and limit.
    pub curve: CurveShape,

    /// Violations needed to trip the breaker.
    pub tolerance: u32,

    /// Time after which a single violation is forgotten, in milliseconds.
    pub tolerance_frame_ms: u64,
}

impl BreakerConfig {
    pub fn to_curve(&self) -> Curve {
        Curve::new(
            Duration::from_millis(self.base_ms),
            self.steps,
            Duration::from_millis(self.limit_ms),
        )
        .with_shape(self.curve)
    }

    pub fn tolerance_frame(&self) -> Duration {
        Duration::from_millis(self.tolerance_frame_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            steps: 10,
            limit_ms: 60_000,
            curve: CurveShape::Quadratic,
            tolerance: 1,
            tolerance_frame_ms: 10_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
