//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed dispatch is attempted again
//! - Compute the backoff delay from the retry curve
//!
//! # Design Decisions
//! - The retry step counts consecutive failures of one batch; success resets it
//! - A batch is retried while `step <= steps`, so `steps` retries follow the first attempt
//! - A disabled policy behaves as `steps = 0`: the first failure is terminal

use std::time::Duration;

use crate::config::CurveConfig;
use crate::resilience::curve::Curve;

/// Outcome of consulting the retry policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-dispatch after `delay`.
    Retry { delay: Duration },
    /// Budget spent after `attempts` resolver invocations.
    GiveUp { attempts: u32 },
}

/// Curve-based retry policy.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    curve: Option<Curve>,
}

impl RetryPolicy {
    pub fn new(config: Option<&CurveConfig>) -> Self {
        Self {
            curve: config.map(CurveConfig::to_curve),
        }
    }

    pub fn disabled() -> Self {
        Self { curve: None }
    }

    /// Retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.curve.map_or(0, |c| c.steps())
    }

    /// Decide what to do once a batch has failed `retry_step` times in a row.
    pub fn decide(&self, retry_step: u32) -> RetryDecision {
        match self.curve {
            Some(curve) if retry_step <= curve.steps() => RetryDecision::Retry {
                delay: curve.at(retry_step),
            },
            _ => RetryDecision::GiveUp {
                attempts: retry_step,
            },
        }
    }
}
