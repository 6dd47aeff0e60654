//! Shared fixtures for unit tests: a seeded homepage/ondemand pair and an
//! instrumented asset fetcher.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::Error;
use crate::fetcher::AssetFetcher;

// Verification key "AQIDBAUGBwg=" decodes to [1..=8]; key_bytes[5] = 6
// selects frame 6 % 4 = 2.
pub(crate) const FIXTURE_HOMEPAGE: &str = concat!(
    r#"<html><head>"#,
    r#"<meta name="twitter-site-verification" content="AQIDBAUGBwg="/>"#,
    r#"<script>{"ondemand.s":"deadbeef01"}</script>"#,
    r#"</head><body><svg><g id="loading-x-anim-2">"#,
    r#"<path d="M0 0 0 0 "#,
    r#"C100,110,120,130,140,150,160,170,180,190,200,210,220,230,240"#,
    r#"C10,20,30,40,50,60,70,80,90,100,110,120,130,140,150"/>"#,
    r#"</g></svg></body></html>"#,
);

pub(crate) const FIXTURE_ONDEMAND: &str = "(a[0],16)(a[1],16)(a[2],16)";

/// Asset fetcher that serves the fixtures, counts round-trips, and can be
/// told to start failing at a given homepage call.
pub(crate) struct MockFetcher {
    pub homepage_calls: AtomicUsize,
    pub ondemand_calls: AtomicUsize,
    /// Fail homepage fetches whose 1-based call number is >= this.
    pub fail_homepage_from: Option<usize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            homepage_calls: AtomicUsize::new(0),
            ondemand_calls: AtomicUsize::new(0),
            fail_homepage_from: None,
        }
    }

    pub fn failing_from(call: usize) -> Self {
        Self {
            fail_homepage_from: Some(call),
            ..Self::new()
        }
    }

    pub fn reset_counters(&self) {
        self.homepage_calls.store(0, Ordering::SeqCst);
        self.ondemand_calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssetFetcher for MockFetcher {
    async fn fetch_homepage(&self) -> Result<String, Error> {
        let call = self.homepage_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(from) = self.fail_homepage_from
            && call >= from
        {
            return Err(Error::Network("mock homepage failure".into()));
        }
        Ok(FIXTURE_HOMEPAGE.to_owned())
    }

    async fn fetch_ondemand(&self, _url: &str) -> Result<String, Error> {
        self.ondemand_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FIXTURE_ONDEMAND.to_owned())
    }
}
