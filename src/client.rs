//! Request driver: rate limiting, signed headers, retry with exponential
//! backoff, and force-refresh on error streaks.
//!
//! The driver owns the guest identity and both header generators. It never
//! interprets response bodies; callers hand it an operation that talks to
//! the HTTP collaborator and report the outcome through the error kinds.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wreq::header::{self, HeaderMap, HeaderValue};
use wreq::{Client as HttpClient, Method};
use wreq_util::Emulation;

use crate::config::Config;
use crate::error::Error;
use crate::fetcher::{AssetFetcher, HttpAssetFetcher};
use crate::guest::{generate_guest_id, generate_guest_token};
use crate::metrics::{ClientMetrics, ema_update};
use crate::transaction::TransactionGenerator;
use crate::xpff::XpffGenerator;

/// Public web-app bearer literal.
pub const BEARER_TOKEN: &str = "Bearer AAAAAAAAAAAAAAAAAAAAANRILgAAAAAAnNwIzUejRCOuH5E6I8xnZz4puTs%3D1Zv7ttfk8LF81IUq16cHjhLTvJu4FA33AGWWjCpTnA";

/// Identity presented on signed GraphQL calls (also embedded in XPFF).
const SIGNED_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:141.0) Gecko/20100101 Firefox/141.0";

/// One-permit-per-interval rate limiter; waiters queue on the next free
/// slot and are cancellable.
struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<tokio::time::Instant>,
}

impl RateLimiter {
    fn new(rps: f64) -> Self {
        let interval = if rps > 0.0 {
            Duration::from_secs_f64(1.0 / rps)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_slot: Mutex::new(tokio::time::Instant::now()),
        }
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Error> {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = tokio::time::Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.interval;
            slot
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep_until(slot) => Ok(()),
        }
    }
}

struct DriverState {
    metrics: ClientMetrics,
    error_streak: u32,
}

/// Client for signed requests against the private GraphQL API.
///
/// Cheap to share behind an `Arc`; mutable state lives in the transaction
/// generator and a short metrics lock.
pub struct XClient {
    config: Config,
    http: HttpClient,
    generator: Arc<TransactionGenerator>,
    xpff: XpffGenerator,
    guest_id: String,
    guest_token: String,
    rate: RateLimiter,
    driver: StdMutex<DriverState>,
}

impl XClient {
    /// Creates a production client, fetching initial signing material.
    pub async fn new() -> Result<Self, Error> {
        Self::with_config(Config::production()).await
    }

    pub async fn with_config(config: Config) -> Result<Self, Error> {
        let fetcher = Arc::new(HttpAssetFetcher::new(config.request_timeout)?);
        Self::with_fetcher(config, fetcher).await
    }

    /// Bring your own asset transport; tests pass an instrumented one.
    pub async fn with_fetcher(
        config: Config,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Result<Self, Error> {
        let generator = Arc::new(TransactionGenerator::new(config.clone(), fetcher).await?);

        let http = HttpClient::builder()
            .emulation(Emulation::Firefox136)
            .gzip(true)
            .brotli(true)
            .zstd(true)
            .timeout(config.request_timeout)
            .build()?;

        let rate = RateLimiter::new(config.rate_limit_rps);

        Ok(Self {
            config,
            http,
            generator,
            xpff: XpffGenerator::new(),
            guest_id: generate_guest_id(),
            guest_token: generate_guest_token(),
            rate,
            driver: StdMutex::new(DriverState {
                metrics: ClientMetrics::default(),
                error_streak: 0,
            }),
        })
    }

    pub fn generator(&self) -> &TransactionGenerator {
        &self.generator
    }

    pub fn guest_id(&self) -> &str {
        &self.guest_id
    }

    pub fn guest_token(&self) -> &str {
        &self.guest_token
    }

    /// Produces the full signed header set for one request.
    pub async fn signed_headers(&self, method: &str, path: &str) -> Result<HeaderMap, Error> {
        let transaction_id = self.generator.generate(method, path).await?;
        let xpff = self.xpff.generate(&self.guest_id, SIGNED_USER_AGENT)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(BEARER_TOKEN));
        headers.insert("x-client-transaction-id", header_value(&transaction_id)?);
        headers.insert("x-xp-forwarded-for", header_value(&xpff)?);
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static(SIGNED_USER_AGENT),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://x.com"));
        headers.insert(header::REFERER, HeaderValue::from_static("https://x.com/"));
        headers.insert("x-twitter-active-user", HeaderValue::from_static("yes"));
        headers.insert("x-twitter-client-language", HeaderValue::from_static("en"));
        Ok(headers)
    }

    /// Runs an operation through the rate limiter and retry loop.
    ///
    /// Per attempt: refresh expired material (stale material is tolerated
    /// if the refresh fails), run the operation, and on failure back off
    /// exponentially. An auth failure, or a streak of
    /// `error_threshold_for_refresh` consecutive failures, forces a
    /// material refresh before the next attempt. Cancellation wins over
    /// every wait.
    pub async fn perform<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.rate.acquire(cancel).await?;

        let start = Instant::now();
        self.driver.lock().unwrap().metrics.total_requests += 1;

        let max_attempts = if self.config.retry_enabled {
            self.config.max_retries + 1
        } else {
            1
        };

        let mut last_error = None;
        let mut attempts_made = 0;

        for attempt in 1..=max_attempts {
            attempts_made = attempt;

            if self.generator.needs_refresh().await {
                if let Err(err) = self.generator.refresh(cancel).await {
                    if matches!(err, Error::Cancelled) {
                        return Err(err);
                    }
                    warn!("pre-attempt refresh failed, using stale material: {err}");
                }
            }

            if self.config.debug_logging {
                debug!("attempt {attempt}/{max_attempts}");
            }

            match op().await {
                Ok(value) => {
                    self.record_success(start, attempt);
                    return Ok(value);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    self.record_failure();
                    let retryable = err.is_retryable();
                    let is_auth = matches!(err, Error::Auth { .. });
                    let is_rate_limit = matches!(err, Error::RateLimited(_));
                    last_error = Some(err);

                    if attempt >= max_attempts || cancel.is_cancelled() || !retryable {
                        break;
                    }
                    self.driver.lock().unwrap().metrics.retry_attempts += 1;

                    let backoff = backoff_delay(
                        self.config.backoff_base,
                        self.config.backoff_multiplier,
                        attempt,
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(backoff) => {}
                    }

                    let streak = self.driver.lock().unwrap().error_streak;
                    let streak_tripped = streak >= self.config.error_threshold_for_refresh;
                    if is_auth || (streak_tripped && !is_rate_limit) {
                        debug!("forcing signing material refresh (streak {streak})");
                        if let Err(err) = self.generator.force_refresh(cancel).await {
                            if matches!(err, Error::Cancelled) {
                                return Err(err);
                            }
                            warn!("force refresh failed: {err}");
                        }
                    }
                }
            }
        }

        self.finish_latency(start);
        let source = last_error.unwrap_or_else(|| Error::Network("request failed".into()));
        if !self.config.retry_enabled {
            return Err(source);
        }
        Err(Error::Exhausted {
            attempts: attempts_made,
            source: Box::new(source),
        })
    }

    /// Signs and executes one request against `url`, classifying the
    /// response status. The URL's path component feeds the signature.
    pub async fn execute_signed(&self, method: &str, url: &str) -> Result<Vec<u8>, Error> {
        let headers = self.signed_headers(method, url_path(url)).await?;

        let http_method = Method::from_bytes(method.as_bytes())
            .map_err(|_| Error::Parse(format!("invalid HTTP method {method:?}")))?;
        let response = self
            .http
            .request(http_method, url)
            .headers(headers)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        classify_response(status, body)
    }

    /// Rate-limited, retrying signed GET.
    pub async fn get(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<u8>, Error> {
        self.perform(cancel, || self.execute_signed("GET", url)).await
    }

    pub fn metrics(&self) -> ClientMetrics {
        self.driver.lock().unwrap().metrics.clone()
    }

    pub fn success_rate(&self) -> f64 {
        self.driver.lock().unwrap().metrics.success_rate()
    }

    pub fn uptime(&self) -> Duration {
        self.driver.lock().unwrap().metrics.uptime_start.elapsed()
    }

    fn record_success(&self, start: Instant, attempt: u32) {
        let mut driver = self.driver.lock().unwrap();
        driver.error_streak = 0;
        driver.metrics.successful_requests += 1;
        driver.metrics.last_success_unix_ms = unix_millis();
        if attempt > 1 && self.config.debug_logging {
            debug!("request succeeded after {attempt} attempts");
        }
        drop(driver);
        self.finish_latency(start);
    }

    fn record_failure(&self) {
        let mut driver = self.driver.lock().unwrap();
        driver.error_streak += 1;
        driver.metrics.failed_requests += 1;
    }

    fn finish_latency(&self, start: Instant) {
        let mut driver = self.driver.lock().unwrap();
        let completed = driver.metrics.successful_requests + driver.metrics.failed_requests;
        let sample_ms = start.elapsed().as_secs_f64() * 1000.0;
        driver.metrics.average_latency_ms = ema_update(
            driver.metrics.average_latency_ms,
            sample_ms,
            completed.saturating_sub(1),
        );
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|err| Error::Parse(format!("generated header not encodable: {err}")))
}

/// Path component of a URL, for the signature input.
fn url_path(url: &str) -> &str {
    let after_scheme = url.find("://").map_or(url, |pos| &url[pos + 3..]);
    match after_scheme.find('/') {
        None => "/",
        Some(pos) => {
            let path = &after_scheme[pos..];
            match path.find(['?', '#']) {
                Some(end) => &path[..end],
                None => path,
            }
        }
    }
}

fn backoff_delay(base: Duration, multiplier: f64, attempt: u32) -> Duration {
    base.mul_f64(multiplier.powi(attempt.saturating_sub(1) as i32))
}

/// Maps a response status onto the error kinds. 404 is surfaced as a
/// missing entity; everything else non-2xx is an auth, throttle, or server
/// condition.
fn classify_response(status: u16, body: Vec<u8>) -> Result<Vec<u8>, Error> {
    let preview = |body: &[u8]| String::from_utf8_lossy(&body[..body.len().min(200)]).into_owned();
    match status {
        200..=299 => Ok(body),
        401 | 403 => Err(Error::Auth {
            status,
            body: preview(&body),
        }),
        404 => Err(Error::NotFound(preview(&body))),
        429 => Err(Error::RateLimited(preview(&body))),
        _ => Err(Error::Server {
            status,
            body: preview(&body),
        }),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
