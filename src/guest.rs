//! Synthetic guest identity, mimicking unauthenticated-browser cookies.
//!
//! The guest id feeds the XPFF key derivation; the guest token is only ever
//! presented as an optional request header and never participates in
//! signing.

use std::time::{SystemTime, UNIX_EPOCH};

const GUEST_TOKEN_DIGITS: usize = 19;

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Guest id in the site's cookie format: `v1%3A<unix_ms>` (URL-encoded
/// `v1:<unix_ms>`).
pub fn generate_guest_id() -> String {
    format!("v1%3A{}", unix_millis())
}

/// 19-digit guest token mixing the current time with a pseudo-random tail.
///
/// The mix is computed in 128-bit space so the seconds-times-1e9 product
/// cannot overflow, then normalized to exactly 19 digits.
pub fn generate_guest_token() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let random_part = fastrand::u64(..1_000_000_000);

    let mixed = u128::from(seconds) * 1_000_000_000 + u128::from(random_part);
    let mut token = mixed.to_string();

    if token.len() > GUEST_TOKEN_DIGITS {
        token.truncate(GUEST_TOKEN_DIGITS);
    } else if token.len() < GUEST_TOKEN_DIGITS {
        token = format!("195{token}");
        token.truncate(GUEST_TOKEN_DIGITS);
    }

    token
}
