//! Transaction-ID generation with layered caching and serialized refresh.
//!
//! Three TTL-bound cache slots (fetched HTML, animation key, verification
//! key) sit behind one reader/writer lock. Refreshes serialize on a
//! separate mutex and hold no lock across network I/O; only the terminal
//! swap takes the write lock, so in-flight signing keeps reading the
//! previous material. A refresh that fails after initialization leaves the
//! old material untouched.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::{debug, warn};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::animation::compute_animation_key;
use crate::config::Config;
use crate::error::Error;
use crate::fetcher::{AssetFetcher, extract_ondemand_url};
use crate::metrics::{GeneratorMetrics, ema_update};
use crate::parser;

/// Keyword mixed into every per-request hash, from the site's client JS.
const HASH_KEYWORD: &str = "obfiowerehiring";

/// Custom epoch baseline: 2023-05-01 00:00:00 UTC.
const EPOCH_SECONDS: u64 = 1_682_924_400;

/// Trailing byte of the masked payload. Named "additional random number"
/// upstream, but fixed at 3 for wire compatibility.
const SUFFIX_BYTE: u8 = 3;

/// How far `force_refresh` backdates expiry to guarantee a miss.
const FORCE_EXPIRE_BACKDATE: Duration = Duration::from_secs(3600);

/// One TTL-bound cache slot.
struct CacheEntry<T> {
    payload: T,
    created_at: Instant,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(payload: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            payload,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn expire_now(&mut self) {
        let now = Instant::now();
        self.expires_at = now.checked_sub(FORCE_EXPIRE_BACKDATE).unwrap_or(now);
    }
}

struct HtmlAssets {
    homepage: String,
    ondemand: String,
}

/// Everything derived from one refresh, swapped in atomically.
struct SigningState {
    html: CacheEntry<HtmlAssets>,
    animation: CacheEntry<String>,
    verification: CacheEntry<String>,
    key_bytes: Vec<u8>,
    row_index: usize,
    key_bytes_indices: Vec<usize>,
}

impl SigningState {
    fn any_expired(&self) -> bool {
        self.html.is_expired() || self.animation.is_expired() || self.verification.is_expired()
    }
}

/// Value-copied snapshot handed to the signing path, so the read lock is
/// held only for the copy.
#[derive(Debug, Clone)]
pub struct SigningMaterial {
    pub key_bytes: Vec<u8>,
    pub animation_key: String,
}

/// Debugging view of the generator state.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratorStats {
    pub key_length: usize,
    pub row_index: usize,
    pub indices_count: usize,
    pub animation_key: String,
    pub homepage_len: usize,
    pub ondemand_len: usize,
    pub material_age_ms: u64,
    pub is_stale: bool,
}

/// Produces `X-Client-Transaction-Id` values from cached signing material.
pub struct TransactionGenerator {
    config: Config,
    fetcher: Arc<dyn AssetFetcher>,
    state: RwLock<Option<SigningState>>,
    // Serializes refresh attempts and their network I/O. Acquisition order
    // is always refresh_lock -> state write lock.
    refresh_lock: Mutex<()>,
    metrics: StdMutex<GeneratorMetrics>,
}

impl TransactionGenerator {
    /// Fetches initial signing material. Construction fails if the material
    /// cannot be produced; afterwards refresh failures degrade to stale
    /// reads instead.
    pub async fn new(config: Config, fetcher: Arc<dyn AssetFetcher>) -> Result<Self, Error> {
        let generator = Self {
            config,
            fetcher,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            metrics: StdMutex::new(GeneratorMetrics::default()),
        };
        generator.refresh(&CancellationToken::new()).await?;
        Ok(generator)
    }

    /// True until the first successful refresh.
    pub async fn is_ready(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Whether any cache slot has expired (or nothing is cached yet).
    pub async fn needs_refresh(&self) -> bool {
        match self.state.read().await.as_ref() {
            None => true,
            Some(state) => state.any_expired(),
        }
    }

    /// Refetches and re-derives all signing material.
    ///
    /// Serialized on the refresh mutex; a task that loses the race returns
    /// as soon as it observes the winner's fresh material. Cancellation
    /// aborts the in-flight fetches and leaves the old cache unchanged.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<(), Error> {
        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited on the mutex.
        if !self.needs_refresh().await {
            return Ok(());
        }

        self.metrics.lock().unwrap().refresh_attempts += 1;

        let result = self.fetch_and_rebuild(cancel).await;
        if let Err(ref err) = result {
            self.metrics.lock().unwrap().refresh_failures += 1;
            warn!("signing material refresh failed: {err}");
        }
        result
    }

    /// Expires all cache slots, then refreshes.
    pub async fn force_refresh(&self, cancel: &CancellationToken) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            if let Some(state) = state.as_mut() {
                state.html.expire_now();
                state.animation.expire_now();
                state.verification.expire_now();
            }
        }
        self.refresh(cancel).await
    }

    async fn fetch_and_rebuild(&self, cancel: &CancellationToken) -> Result<(), Error> {
        // Only the refresh mutex is held here; readers stay on the old
        // material until the swap below.
        let homepage = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.fetcher.fetch_homepage() => result?,
        };
        let ondemand_url = extract_ondemand_url(&homepage)?;
        let ondemand = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.fetcher.fetch_ondemand(&ondemand_url) => result?,
        };
        self.metrics.lock().unwrap().asset_fetches += 1;

        let (row_index, key_bytes_indices) = parser::extract_indices(&ondemand)?;
        let verification_key = parser::extract_verification_key(&homepage)?;
        let key_bytes = parser::decode_verification_key(&verification_key)?;
        let frames = parser::extract_frame_rows(&homepage, &key_bytes)?;
        let animation_key =
            compute_animation_key(&frames, &key_bytes, row_index, &key_bytes_indices)?;

        debug!(
            "signing material refreshed: {} key bytes, {} indices, animation key {animation_key}",
            key_bytes.len(),
            key_bytes_indices.len(),
        );

        let mut state = self.state.write().await;
        *state = Some(SigningState {
            html: CacheEntry::new(HtmlAssets { homepage, ondemand }, self.config.html_ttl),
            animation: CacheEntry::new(animation_key, self.config.animation_ttl),
            verification: CacheEntry::new(verification_key, self.config.verification_ttl),
            key_bytes,
            row_index,
            key_bytes_indices,
        });
        drop(state);

        self.metrics.lock().unwrap().last_refresh_unix_ms = unix_millis();
        Ok(())
    }

    /// Generates a transaction ID for a request, refreshing expired
    /// material first. A failed refresh degrades to the previous material.
    pub async fn generate(&self, method: &str, path: &str) -> Result<String, Error> {
        let start = Instant::now();

        if self.needs_refresh().await {
            self.metrics.lock().unwrap().cache_misses += 1;
            if let Err(err) = self.refresh(&CancellationToken::new()).await {
                if !self.is_ready().await {
                    return Err(err);
                }
                warn!("generating against stale signing material: {err}");
            }
        } else {
            self.metrics.lock().unwrap().cache_hits += 1;
        }

        let material = self.material().await?;
        let id = build_transaction_id(method, path, &material)?;

        let mut metrics = self.metrics.lock().unwrap();
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics.average_generation_time_ms = ema_update(
            metrics.average_generation_time_ms,
            elapsed_ms,
            metrics.total_generations,
        );
        metrics.total_generations += 1;

        Ok(id)
    }

    /// Snapshot of the current key bytes and animation key.
    pub async fn material(&self) -> Result<SigningMaterial, Error> {
        let state = self.state.read().await;
        let state = state
            .as_ref()
            .ok_or_else(|| Error::Parse("signing material not initialized".into()))?;
        Ok(SigningMaterial {
            key_bytes: state.key_bytes.clone(),
            animation_key: state.animation.payload.clone(),
        })
    }

    pub fn metrics(&self) -> GeneratorMetrics {
        self.metrics.lock().unwrap().clone()
    }

    pub async fn stats(&self) -> Option<GeneratorStats> {
        let state = self.state.read().await;
        state.as_ref().map(|state| GeneratorStats {
            key_length: state.key_bytes.len(),
            row_index: state.row_index,
            indices_count: state.key_bytes_indices.len(),
            animation_key: state.animation.payload.clone(),
            homepage_len: state.html.payload.homepage.len(),
            ondemand_len: state.html.payload.ondemand.len(),
            material_age_ms: state.html.created_at.elapsed().as_millis() as u64,
            is_stale: state.any_expired(),
        })
    }

    /// Backdates every cache slot without refreshing (test hook for
    /// simultaneous-expiry scenarios).
    #[cfg(test)]
    pub(crate) async fn expire_all(&self) {
        let mut state = self.state.write().await;
        if let Some(state) = state.as_mut() {
            state.html.expire_now();
            state.animation.expire_now();
            state.verification.expire_now();
        }
    }
}

/// Assembles one transaction ID with a fresh timestamp and mask byte.
fn build_transaction_id(
    method: &str,
    path: &str,
    material: &SigningMaterial,
) -> Result<String, Error> {
    let mut mask = [0u8; 1];
    OsRng
        .try_fill_bytes(&mut mask)
        .map_err(|err| Error::Crypto(format!("OS RNG unavailable: {err}")))?;

    Ok(assemble_transaction_id(
        method,
        path,
        epoch_seconds_now(),
        &material.key_bytes,
        &material.animation_key,
        mask[0],
    ))
}

/// Deterministic core of the transaction ID: hash, concatenate, XOR-mask,
/// and base64 without padding.
pub(crate) fn assemble_transaction_id(
    method: &str,
    path: &str,
    epoch_seconds: u32,
    key_bytes: &[u8],
    animation_key: &str,
    mask_byte: u8,
) -> String {
    let hash_input = format!("{method}!{path}!{epoch_seconds}{HASH_KEYWORD}{animation_key}");
    let digest = Sha256::digest(hash_input.as_bytes());

    let mut payload = Vec::with_capacity(key_bytes.len() + 4 + 16 + 1);
    payload.extend_from_slice(key_bytes);
    payload.extend_from_slice(&epoch_seconds.to_le_bytes());
    payload.extend_from_slice(&digest[..16]);
    payload.push(SUFFIX_BYTE);

    let mut masked = Vec::with_capacity(payload.len() + 1);
    masked.push(mask_byte);
    masked.extend(payload.iter().map(|byte| byte ^ mask_byte));

    let encoded = STANDARD.encode(&masked);
    encoded.trim_end_matches('=').to_owned()
}

/// Seconds since the custom epoch, saturating below it.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the offset fits in u32 until 2159"
)]
fn epoch_seconds_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().saturating_sub(EPOCH_SECONDS) as u32)
        .unwrap_or(0)
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testutil::MockFetcher;

    async fn fixture_generator(config: Config) -> (Arc<TransactionGenerator>, Arc<MockFetcher>) {
        let mock = Arc::new(MockFetcher::new());
        let fetcher: Arc<dyn AssetFetcher> = mock.clone();
        let generator = Arc::new(TransactionGenerator::new(config, fetcher).await.unwrap());
        (generator, mock)
    }

    fn fixture_material() -> SigningMaterial {
        SigningMaterial {
            key_bytes: vec![1, 2, 3, 4, 5, 6, 7, 8],
            animation_key: "ff0a1b2c3d".to_owned(),
        }
    }

    #[test]
    fn test_masked_payload_length() {
        let material = fixture_material();
        let id = assemble_transaction_id("GET", "/graphql/foo/Bar", 1_700_000, &material.key_bytes, &material.animation_key, 0x5a);

        let padding = "=".repeat((4 - id.len() % 4) % 4);
        let decoded = STANDARD.decode(format!("{id}{padding}")).unwrap();
        assert_eq!(decoded.len(), 1 + material.key_bytes.len() + 4 + 16 + 1);
    }

    #[test]
    fn test_xor_mask_recoverable() {
        let material = fixture_material();
        let seconds = 1_700_000_u32;
        let id = assemble_transaction_id("GET", "/graphql/foo/Bar", seconds, &material.key_bytes, &material.animation_key, 0xc3);

        let padding = "=".repeat((4 - id.len() % 4) % 4);
        let decoded = STANDARD.decode(format!("{id}{padding}")).unwrap();
        let mask = decoded[0];
        let unmasked = decoded[1..].iter().map(|b| b ^ mask).collect::<Vec<_>>();

        assert_eq!(&unmasked[..8], &material.key_bytes[..]);
        assert_eq!(&unmasked[8..12], &seconds.to_le_bytes());
        assert_eq!(unmasked[28], 3);

        let hash_input = format!(
            "GET!/graphql/foo/Bar!{seconds}{HASH_KEYWORD}{}",
            material.animation_key
        );
        let digest = Sha256::digest(hash_input.as_bytes());
        assert_eq!(&unmasked[12..28], &digest[..16]);
    }

    #[test]
    fn test_deterministic_with_fixed_time_and_mask() {
        let material = fixture_material();
        let first = assemble_transaction_id("GET", "/graphql/foo/Bar", 17_075_600, &material.key_bytes, &material.animation_key, 0x00);
        let second = assemble_transaction_id("GET", "/graphql/foo/Bar", 17_075_600, &material.key_bytes, &material.animation_key, 0x00);
        assert_eq!(first, second);
        assert!(!first.ends_with('='));
    }

    #[test]
    fn test_time_bytes_monotonic() {
        let material = fixture_material();
        let mut previous = 0u32;
        for seconds in [100u32, 5_000, 5_000, 90_000] {
            let id = assemble_transaction_id("GET", "/p", seconds, &material.key_bytes, &material.animation_key, 0x11);
            let padding = "=".repeat((4 - id.len() % 4) % 4);
            let decoded = STANDARD.decode(format!("{id}{padding}")).unwrap();
            let mask = decoded[0];
            let time_bytes: [u8; 4] = [
                decoded[9] ^ mask,
                decoded[10] ^ mask,
                decoded[11] ^ mask,
                decoded[12] ^ mask,
            ];
            let recovered = u32::from_le_bytes(time_bytes);
            assert!(recovered >= previous);
            previous = recovered;
        }
    }

    #[tokio::test]
    async fn test_initialize_parses_fixture() {
        let (generator, mock) = fixture_generator(Config::production()).await;

        assert!(generator.is_ready().await);
        let material = generator.material().await.unwrap();
        assert_eq!(material.key_bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(!material.animation_key.is_empty());
        assert_eq!(mock.homepage_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.ondemand_calls.load(Ordering::SeqCst), 1);

        let stats = generator.stats().await.unwrap();
        assert_eq!(stats.key_length, 8);
        assert_eq!(stats.row_index, 0);
        assert_eq!(stats.indices_count, 2);
        assert!(!stats.is_stale);
    }

    #[tokio::test]
    async fn test_initialize_failure_aborts_construction() {
        let mock = Arc::new(MockFetcher::failing_from(1));
        let fetcher: Arc<dyn AssetFetcher> = mock.clone();
        let result = TransactionGenerator::new(Config::production(), fetcher).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_zero_ttl_refreshes_every_generation() {
        let (generator, mock) = fixture_generator(Config::ultra_fresh()).await;

        generator.generate("GET", "/a").await.unwrap();
        generator.generate("GET", "/b").await.unwrap();

        // One fetch pair at construction plus one per generation.
        assert_eq!(mock.homepage_calls.load(Ordering::SeqCst), 3);
        assert_eq!(mock.ondemand_calls.load(Ordering::SeqCst), 3);
        assert_eq!(generator.metrics().cache_misses, 2);
    }

    #[tokio::test]
    async fn test_long_ttl_serves_from_cache() {
        let (generator, mock) = fixture_generator(Config::production()).await;

        for _ in 0..5 {
            generator.generate("GET", "/a").await.unwrap();
        }

        assert_eq!(mock.homepage_calls.load(Ordering::SeqCst), 1);
        let metrics = generator.metrics();
        assert_eq!(metrics.cache_hits, 5);
        assert_eq!(metrics.cache_misses, 0);
        assert_eq!(metrics.total_generations, 5);
    }

    #[tokio::test]
    async fn test_refresh_failure_degrades_to_stale_material() {
        let mock = Arc::new(MockFetcher::failing_from(2));
        let fetcher: Arc<dyn AssetFetcher> = mock.clone();
        let generator = TransactionGenerator::new(Config::ultra_fresh(), fetcher)
            .await
            .unwrap();

        // TTLs are zero, so this generation wants a refresh; the refresh
        // fails but the old material still signs.
        let id = generator.generate("GET", "/a").await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(generator.metrics().refresh_failures, 1);
    }

    #[tokio::test]
    async fn test_concurrent_expiry_triggers_single_roundtrip() {
        let (generator, mock) = fixture_generator(Config::production()).await;
        generator.expire_all().await;
        mock.reset_counters();

        let mut handles = Vec::new();
        for task in 0..32 {
            let generator = generator.clone();
            handles.push(tokio::spawn(async move {
                generator.generate("GET", &format!("/p/{task}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(mock.homepage_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.ondemand_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_refetches_fresh_material() {
        let (generator, mock) = fixture_generator(Config::production()).await;
        assert!(!generator.needs_refresh().await);

        generator
            .force_refresh(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(mock.homepage_calls.load(Ordering::SeqCst), 2);
        assert!(!generator.needs_refresh().await);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_keeps_old_cache() {
        let (generator, _mock) = fixture_generator(Config::production()).await;
        let before = generator.material().await.unwrap();

        generator.expire_all().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = generator.refresh(&cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));

        let after = generator.material().await.unwrap();
        assert_eq!(before.animation_key, after.animation_key);
    }

    #[tokio::test]
    async fn test_generated_id_round_trips() {
        let (generator, _mock) = fixture_generator(Config::production()).await;
        let id = generator.generate("GET", "/graphql/foo/Bar").await.unwrap();

        let padding = "=".repeat((4 - id.len() % 4) % 4);
        let decoded = STANDARD.decode(format!("{id}{padding}")).unwrap();
        // 1 mask byte + 8 key bytes + 4 time bytes + 16 hash bytes + suffix.
        assert_eq!(decoded.len(), 30);
        let mask = decoded[0];
        assert_eq!(decoded[29] ^ mask, 3);
    }
}
