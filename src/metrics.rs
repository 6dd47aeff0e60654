//! Performance counters for the generator and the request driver.
//!
//! Counters are mutated under short locks owned by their component and
//! snapshotted by value; nothing here blocks the signing path.

use std::time::Instant;

use serde::Serialize;

/// Smoothing factor for the exponential moving averages.
pub(crate) const EMA_ALPHA: f64 = 0.1;

/// Counters for the transaction generator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratorMetrics {
    pub total_generations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub asset_fetches: u64,
    pub refresh_attempts: u64,
    pub refresh_failures: u64,
    pub average_generation_time_ms: f64,
    pub last_refresh_unix_ms: u64,
}

/// Counters for the request driver.
#[derive(Debug, Clone, Serialize)]
pub struct ClientMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retry_attempts: u64,
    pub average_latency_ms: f64,
    pub last_success_unix_ms: u64,
    #[serde(skip)]
    pub uptime_start: Instant,
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            retry_attempts: 0,
            average_latency_ms: 0.0,
            last_success_unix_ms: 0,
            uptime_start: Instant::now(),
        }
    }
}

impl ClientMetrics {
    /// Fraction of completed requests that succeeded, as a percentage.
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_requests + self.failed_requests;
        if completed == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / completed as f64 * 100.0
    }
}

/// Folds a new sample into an exponential moving average. The first sample
/// seeds the average directly.
pub(crate) fn ema_update(current: f64, sample: f64, prior_samples: u64) -> f64 {
    if prior_samples == 0 {
        sample
    } else {
        (1.0 - EMA_ALPHA) * current + EMA_ALPHA * sample
    }
}
