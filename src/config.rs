//! Signing and request-driver configuration.

use std::time::Duration;

/// Tunable knobs for the transaction generator and request driver.
///
/// All fields are fixed after construction. Three presets are provided;
/// [`Config::production`] is the default.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long fetched homepage/ondemand text stays valid.
    pub html_ttl: Duration,
    /// How long a derived animation key stays valid.
    pub animation_ttl: Duration,
    /// How long the extracted verification key stays valid.
    pub verification_ttl: Duration,

    /// Whether `perform` retries failed operations.
    pub retry_enabled: bool,
    /// Maximum retries per request (on top of the initial attempt).
    pub max_retries: u32,
    /// Base backoff between retries.
    pub backoff_base: Duration,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,

    /// Consecutive failures before the driver forces a material refresh.
    pub error_threshold_for_refresh: u32,

    /// Per-request timeout for all HTTP traffic.
    pub request_timeout: Duration,
    /// Requests per second admitted by the rate limiter.
    pub rate_limit_rps: f64,

    /// Verbose per-attempt logging.
    pub debug_logging: bool,
}

impl Config {
    /// Aggressive caching, retries on. Suitable for long-running use.
    pub fn production() -> Self {
        Self {
            html_ttl: Duration::from_secs(6 * 3600),
            animation_ttl: Duration::from_secs(3 * 3600),
            verification_ttl: Duration::from_secs(6 * 3600),
            retry_enabled: true,
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            error_threshold_for_refresh: 2,
            request_timeout: Duration::from_secs(30),
            rate_limit_rps: 50.0 / 60.0,
            debug_logging: false,
        }
    }

    /// Minute-scale TTLs and a single retry, for fast iteration.
    pub fn development() -> Self {
        Self {
            html_ttl: Duration::from_secs(10 * 60),
            animation_ttl: Duration::from_secs(15 * 60),
            verification_ttl: Duration::from_secs(10 * 60),
            retry_enabled: true,
            max_retries: 1,
            backoff_base: Duration::from_millis(200),
            backoff_multiplier: 1.5,
            error_threshold_for_refresh: 1,
            request_timeout: Duration::from_secs(15),
            rate_limit_rps: 100.0 / 60.0,
            debug_logging: true,
        }
    }

    /// No caching, no retries. Every call refetches everything.
    pub fn ultra_fresh() -> Self {
        Self {
            html_ttl: Duration::ZERO,
            animation_ttl: Duration::ZERO,
            verification_ttl: Duration::ZERO,
            retry_enabled: false,
            max_retries: 0,
            backoff_base: Duration::ZERO,
            backoff_multiplier: 1.0,
            error_threshold_for_refresh: 1,
            request_timeout: Duration::from_secs(10),
            rate_limit_rps: 30.0 / 60.0,
            debug_logging: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::production()
    }
}
