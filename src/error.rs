//! Error kinds for the signing core.
//!
//! Parse, extraction, and crypto failures during a refresh never invalidate
//! previously cached signing material; callers keep working with the stale
//! copy while the error surfaces.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport or timeout failure while fetching assets or executing a
    /// signed request.
    #[error("network error: {0}")]
    Network(String),

    /// Structural expectations failed on the homepage HTML or ondemand JS
    /// (missing meta tag, missing index pattern, missing frame or path).
    #[error("parse error: {0}")]
    Parse(String),

    /// The selected animation frame parsed but yielded no numeric rows.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// OS RNG or cipher failure. Not retryable.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// 401/403 from the signed endpoint; signing material is likely stale.
    #[error("authentication rejected: HTTP {status}: {body}")]
    Auth { status: u16, body: String },

    /// 429 from the signed endpoint. Not a signing failure.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// 5xx (or otherwise unexpected status) from the signed endpoint.
    #[error("server error: HTTP {status}: {body}")]
    Server { status: u16, body: String },

    /// The endpoint reported a missing entity. Surfaced to the caller as-is.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// All retry attempts failed; wraps the last underlying error.
    #[error("request failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Whether the retry loop should attempt this error again.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_)
            | Self::Parse(_)
            | Self::Extraction(_)
            | Self::Auth { .. }
            | Self::RateLimited(_)
            | Self::Server { .. } => true,
            Self::Crypto(_) | Self::NotFound(_) | Self::Cancelled | Self::Exhausted { .. } => false,
        }
    }
}

impl From<wreq::Error> for Error {
    fn from(err: wreq::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::Parse(format!("base64 decode: {err}"))
    }
}
