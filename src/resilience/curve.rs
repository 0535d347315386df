//! Step curves for backoff and adaptive expiration.
//!
//! A curve maps a step index to a duration. It starts at `base` on step 0
//! and eases towards `limit` as the step approaches `steps`, never exceeding
//! it. The same curve type drives retry backoff, breaker open windows and
//! cache TTL growth.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Easing between a curve's base and limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveShape {
    /// `base + (limit - base) * progress^2`
    #[default]
    Quadratic,
    /// `base + (limit - base) * progress`
    Linear,
}

impl CurveShape {
    fn ease(self, progress: f64) -> f64 {
        match self {
            CurveShape::Quadratic => progress * progress,
            CurveShape::Linear => progress,
        }
    }
}

/// A monotonic step → duration function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    base: Duration,
    steps: u32,
    limit: Duration,
    shape: CurveShape,
}

impl Curve {
    /// Create a quadratic curve. A `limit` lower than `base` is raised to `base`.
    pub fn new(base: Duration, steps: u32, limit: Duration) -> Self {
        Self {
            base,
            steps,
            limit: limit.max(base),
            shape: CurveShape::Quadratic,
        }
    }

    pub fn with_shape(mut self, shape: CurveShape) -> Self {
        self.shape = shape;
        self
    }

    /// Number of steps until the curve reaches its limit.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Duration for the given step.
    pub fn at(&self, step: u32) -> Duration {
        if self.steps == 0 || step == 0 {
            return self.base;
        }

        let progress = f64::from(step.min(self.steps)) / f64::from(self.steps);
        let span = self.limit.saturating_sub(self.base).as_nanos() as f64;
        let growth = Duration::from_nanos((span * self.shape.ease(progress)).round() as u64);
        (self.base + growth).min(self.limit)
    }
}
