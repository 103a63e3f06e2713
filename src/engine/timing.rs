//! Simulated-time context shared by the controller and the machine it builds.
//!
//! A scale of `s` makes one simulated second last `1/s` wall-clock seconds.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

pub const DEFAULT_TIME_SCALE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct Timing {
    scale_bits: Arc<AtomicU64>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            scale_bits: Arc::new(AtomicU64::new(DEFAULT_TIME_SCALE.to_bits())),
        }
    }
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scale(&self) -> f64 {
        f64::from_bits(self.scale_bits.load(Ordering::Acquire))
    }

    /// Apply `factor` until the returned guard drops. Non-positive or
    /// non-finite factors fall back to the default scale.
    pub fn scaled(&self, factor: f64) -> ScaledTiming<'_> {
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            tracing::warn!(factor, "ignoring invalid time scale");
            DEFAULT_TIME_SCALE
        };
        self.scale_bits.store(factor.to_bits(), Ordering::Release);
        ScaledTiming { timing: self }
    }

    pub fn reset(&self) {
        self.scale_bits
            .store(DEFAULT_TIME_SCALE.to_bits(), Ordering::Release);
    }

    /// Wall-clock duration of `simulated` at the current scale.
    pub fn wall(&self, simulated: Duration) -> Duration {
        Duration::try_from_secs_f64(simulated.as_secs_f64() / self.scale()).unwrap_or(Duration::MAX)
    }

    pub async fn sleep(&self, simulated: Duration) {
        tokio::time::sleep(self.wall(simulated)).await;
    }
}

/// Restores the default scale when dropped, on every exit path of a run.
#[must_use = "the time scale resets as soon as the guard is dropped"]
pub struct ScaledTiming<'a> {
    timing: &'a Timing,
}

impl Drop for ScaledTiming<'_> {
    fn drop(&mut self) {
        self.timing.reset();
    }
}
