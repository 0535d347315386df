//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, curve limit >= base)
//! - Detect duplicate delimiter fields
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: StoreConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{CurveConfig, StoreConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("delimiter contains an empty field name")]
    EmptyDelimiter,

    #[error("delimiter field `{0}` is listed twice")]
    DuplicateDelimiter(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{section}: limit_ms ({limit_ms}) is lower than base_ms ({base_ms})")]
    InvertedCurve {
        section: &'static str,
        base_ms: u64,
        limit_ms: u64,
    },
}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &StoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for field in &config.delimiter {
        if field.is_empty() {
            errors.push(ValidationError::EmptyDelimiter);
        } else if !seen.insert(field.as_str()) {
            errors.push(ValidationError::DuplicateDelimiter(field.clone()));
        }
    }

    if let Some(cache) = &config.cache {
        if cache.limit == 0 {
            errors.push(ValidationError::Zero("cache.limit"));
        }
        if cache.sweep_interval_ms == 0 {
            errors.push(ValidationError::Zero("cache.sweep_interval_ms"));
        }
        check_curve("cache.ttl", &cache.ttl, &mut errors);
    }

    if let Some(batch) = &config.batch {
        if batch.limit == 0 {
            errors.push(ValidationError::Zero("batch.limit"));
        }
    }

    if let Some(retry) = &config.retry {
        check_curve("retry", retry, &mut errors);
    }

    if let Some(breaker) = &config.breaker {
        if breaker.tolerance == 0 {
            errors.push(ValidationError::Zero("breaker.tolerance"));
        }
        if breaker.limit_ms < breaker.base_ms {
            errors.push(ValidationError::InvertedCurve {
                section: "breaker",
                base_ms: breaker.base_ms,
                limit_ms: breaker.limit_ms,
            });
        }
    }

    if config.timeout_ms == Some(0) {
        errors.push(ValidationError::Zero("timeout_ms"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_curve(section: &'static str, curve: &CurveConfig, errors: &mut Vec<ValidationError>) {
    if curve.limit_ms < curve.base_ms {
        errors.push(ValidationError::InvertedCurve {
            section,
            base_ms: curve.base_ms,
            limit_ms: curve.limit_ms,
        });
    }
}
