//! Adaptive rescaling of quotas under load.
//!
//! [`scale`] is pure: the scaled quota lives only for the check it is passed
//! to. [`LoadFactor`] is the single piece of shared state, an atomically
//! swapped multiplier set by whatever watches system load.

use std::sync::atomic::{AtomicU64, Ordering};

use super::quota::QuotaConfig;
use crate::error::{GateError, Result};

/// Derive a request-scoped quota with `max_requests = floor(max_requests * factor)`.
///
/// The window is unchanged. The float-to-int cast saturates, so factors large
/// enough to overflow cap at `u32::MAX`.
pub fn scale(quota: &QuotaConfig, factor: f64) -> QuotaConfig {
    let scaled = (f64::from(quota.max_requests) * factor).floor();
    QuotaConfig { window: quota.window, max_requests: scaled as u32 }
}

/// Current load multiplier, clamped to `[min, max]`.
#[derive(Debug)]
pub struct LoadFactor {
    bits: AtomicU64,
    min: f64,
    max: f64,
}

impl LoadFactor {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(GateError::Config(format!(
                "invalid load factor bounds [{min}, {max}]"
            )));
        }
        Ok(Self { bits: AtomicU64::new(1.0f64.clamp(min, max).to_bits()), min, max })
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Store a new factor and return the value actually applied after clamping.
    pub fn set(&self, factor: f64) -> Result<f64> {
        if !factor.is_finite() {
            return Err(GateError::Config(format!("load factor must be finite, got {factor}")));
        }
        let applied = factor.clamp(self.min, self.max);
        self.bits.store(applied.to_bits(), Ordering::Release);
        Ok(applied)
    }

    pub fn reset(&self) {
        self.bits.store(1.0f64.clamp(self.min, self.max).to_bits(), Ordering::Release);
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

impl Default for LoadFactor {
    fn default() -> Self {
        Self { bits: AtomicU64::new(1.0f64.to_bits()), min: 0.0, max: 1.0 }
    }
}
