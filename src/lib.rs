//! Request-signing core for X's private GraphQL API.
//!
//! Reconstructs the two opaque headers the server requires —
//! `X-Client-Transaction-Id` and `X-Xp-Forwarded-For` — from the live HTML
//! and JavaScript assets served to browsers, with layered TTL caching,
//! serialized refresh, and a retrying request driver.
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use xapi_rs::XClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), xapi_rs::Error> {
//!     let client = XClient::new().await?;
//!     let headers = client.signed_headers("GET", "/graphql/abc/Operation").await?;
//!     println!("{:?}", headers["x-client-transaction-id"]);
//!
//!     let cancel = CancellationToken::new();
//!     let body = client
//!         .get(&cancel, "https://api.x.com/graphql/abc/Operation")
//!         .await?;
//!     println!("{} bytes", body.len());
//!     Ok(())
//! }
//! ```

pub mod animation;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod guest;
pub mod metrics;
pub mod numeric;
pub mod parser;
pub mod transaction;
pub mod xpff;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::XClient;
pub use config::Config;
pub use error::Error;
pub use fetcher::{AssetFetcher, HttpAssetFetcher};
pub use metrics::{ClientMetrics, GeneratorMetrics};
pub use transaction::{GeneratorStats, SigningMaterial, TransactionGenerator};
pub use xpff::XpffGenerator;
