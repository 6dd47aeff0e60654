use std::env;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use xapi_rs::{Config, XClient};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <method> <path> [preset] [--send]", args[0]);
        eprintln!("  method: GET or POST");
        eprintln!("  path:   GraphQL path to sign (e.g. /graphql/abc/UserByScreenName)");
        eprintln!("  preset: production, development, ultra-fresh (default: production)");
        eprintln!("  --send: execute the signed request against api.x.com");
        std::process::exit(1);
    }

    let method = args[1].to_uppercase();
    let path = args[2].clone();

    let preset = args.get(3).map(|s| s.as_str()).unwrap_or("production");
    let config = match preset {
        "development" => Config::development(),
        "ultra-fresh" => Config::ultra_fresh(),
        "production" | "--send" => Config::production(),
        other => {
            eprintln!("Unknown preset: {}. Using production.", other);
            Config::production()
        }
    };

    let send = args.iter().any(|a| a == "--send");

    eprintln!("Fetching signing material...");
    let client = XClient::with_config(config).await?;

    let headers = client.signed_headers(&method, &path).await?;
    println!("Signed header set for {} {}:", method, path);
    for (name, value) in &headers {
        println!("  {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }

    if let Some(stats) = client.generator().stats().await {
        eprintln!(
            "\nMaterial: {} key bytes, {} indices, animation key {}",
            stats.key_length, stats.indices_count, stats.animation_key
        );
    }

    if send {
        let url = format!("https://api.x.com{}", path);
        eprintln!("\nExecuting {} {} ...", method, url);
        let cancel = CancellationToken::new();
        let body = client
            .perform(&cancel, || client.execute_signed(&method, &url))
            .await?;
        println!("{}", String::from_utf8_lossy(&body));

        let metrics = client.metrics();
        eprintln!(
            "Done: {} request(s), {:.1}% success, {:.1} ms avg latency",
            metrics.total_requests,
            client.success_rate(),
            metrics.average_latency_ms
        );
    }

    Ok(())
}
