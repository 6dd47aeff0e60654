//! `X-Xp-Forwarded-For` header generation.
//!
//! The header is an AES-256-GCM envelope over a small JSON payload of
//! navigator properties plus a creation timestamp. The cipher key is
//! SHA-256 over the ASCII base key concatenated with the (still
//! URL-encoded) guest id; the base key is used as a raw string literal, not
//! decoded from hex.

use std::time::{SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Base key from the site's client-side implementation, consumed as ASCII.
const BASE_KEY: &str = "0e6be1f1e21ffc33590b888fd4dc81b19713e570e805d4e5df80a493c9571a05";

const NONCE_LEN: usize = 12;

/// Payloads older than this are considered stale by the server.
const FRESHNESS_WINDOW_MS: i64 = 300_000;

#[derive(Debug, Serialize)]
struct NavigatorProperties {
    #[serde(rename = "hasBeenActive")]
    has_been_active: &'static str,
    #[serde(rename = "userAgent")]
    user_agent: String,
    webdriver: &'static str,
}

#[derive(Debug, Serialize)]
struct XpffPayload {
    navigator_properties: NavigatorProperties,
    created_at: i64,
}

/// Builds `X-Xp-Forwarded-For` header values.
pub struct XpffGenerator {
    base_key: &'static str,
}

impl XpffGenerator {
    pub fn new() -> Self {
        Self { base_key: BASE_KEY }
    }

    /// Produces a fresh header value for the given guest identity.
    ///
    /// Output is `hex(nonce || ciphertext || tag)` with a random 12-byte
    /// nonce; values are generated per request, never cached.
    pub fn generate(&self, guest_id: &str, user_agent: &str) -> Result<String, Error> {
        let payload = XpffPayload {
            navigator_properties: NavigatorProperties {
                has_been_active: "true",
                user_agent: user_agent.to_owned(),
                webdriver: "false",
            },
            created_at: unix_millis(),
        };
        let plaintext = serde_json::to_vec(&payload)
            .map_err(|err| Error::Crypto(format!("payload encoding: {err}")))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|err| Error::Crypto(format!("OS RNG unavailable: {err}")))?;

        let sealed = seal(&self.derive_key(guest_id), &nonce, &plaintext)?;
        Ok(hex::encode(sealed))
    }

    /// SHA-256 over the raw base key bytes followed by the guest id bytes.
    fn derive_key(&self, guest_id: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.base_key.as_bytes());
        hasher.update(guest_id.as_bytes());
        hasher.finalize().into()
    }
}

impl Default for XpffGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// AES-256-GCM with the nonce prepended; the 16-byte auth tag rides at the
/// end of the ciphertext.
fn seal(key: &[u8; 32], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| Error::Crypto("AES-GCM encryption failed".into()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Whether a payload created at `created_at_ms` is still inside the
/// server's five-minute acceptance window.
pub fn is_fresh(created_at_ms: i64, now_ms: i64) -> bool {
    now_ms - created_at_ms < FRESHNESS_WINDOW_MS
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
