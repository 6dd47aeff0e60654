//! Retrieves the public homepage and the dynamically-named ondemand JS asset.
//!
//! The ondemand chunk's URL embeds a frequently-rotated content hash that is
//! only discoverable from the homepage HTML, so a refresh is always a
//! two-step fetch: homepage first, then the asset it points at.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use wreq::{Client, header};
use wreq_util::Emulation;

use crate::error::Error;

const HOMEPAGE_URL: &str = "https://x.com/";
const ONDEMAND_BASE_URL: &str = "https://abs.twimg.com/responsive-web/client-web";

/// Desktop browser identity presented on asset fetches.
pub(crate) const ASSET_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0.0.0 Safari/537.36";

/// Transport seam for the refresh path: fetch a URL, return its text.
///
/// The cache controller only ever needs these two requests; tests swap in an
/// instrumented implementation to count round-trips and inject failures.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch_homepage(&self) -> Result<String, Error>;
    async fn fetch_ondemand(&self, url: &str) -> Result<String, Error>;
}

/// Locates the `"ondemand.s":"<hash>"` marker in homepage HTML and builds
/// the asset URL from it. Single- and double-quoted forms both occur.
pub fn extract_ondemand_url(html: &str) -> Result<String, Error> {
    let marker = Regex::new(r#"['"]ondemand\.s['"]:\s*['"]([A-Za-z0-9]+)['"]"#)
        .map_err(|err| Error::Parse(format!("pattern compile: {err}")))?;

    marker
        .captures(html)
        .map(|cap| format!("{ONDEMAND_BASE_URL}/ondemand.s.{}a.js", &cap[1]))
        .ok_or_else(|| Error::Parse("ondemand file hash not found in homepage".into()))
}

/// Asset fetcher over a browser-emulating HTTP client.
pub struct HttpAssetFetcher {
    http: Client,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .emulation(Emulation::Chrome143)
            .gzip(true)
            .brotli(true)
            .zstd(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    async fn get_text(&self, url: &str) -> Result<String, Error> {
        let response = self
            .http
            .get(url)
            .header(header::USER_AGENT, ASSET_USER_AGENT)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!("{url} returned HTTP {status}")));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch_homepage(&self) -> Result<String, Error> {
        self.get_text(HOMEPAGE_URL).await
    }

    async fn fetch_ondemand(&self, url: &str) -> Result<String, Error> {
        self.get_text(url).await
    }
}
