use std::env;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use xapi_rs::{Config, XClient};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <graphql-path>", args[0]);
        eprintln!("  e.g. /graphql/ck5KkZ8t5cOmoLssopN99Q/UserByScreenName?variables=...");
        std::process::exit(1);
    }

    let client = XClient::with_config(Config::development()).await?;
    let url = format!("https://api.x.com{}", args[1]);

    println!("GET {}", url);
    let cancel = CancellationToken::new();
    match client.get(&cancel, &url).await {
        Ok(body) => {
            println!("{}", String::from_utf8_lossy(&body));
        }
        Err(e) => {
            eprintln!("Request failed: {}", e);
        }
    }

    let metrics = client.metrics();
    println!(
        "\n{} request(s), {} retried, success rate {:.1}%",
        metrics.total_requests,
        metrics.retry_attempts,
        client.success_rate()
    );

    Ok(())
}
