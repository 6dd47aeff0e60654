use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use xapi_rs::XClient;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // One client, shared; signing is lock-light so N tasks scale well.
    let client = Arc::new(XClient::new().await?);

    let paths: Vec<String> = (0..32)
        .map(|i| format!("/graphql/op{i}/UserByScreenName"))
        .collect();

    println!("Signing {} requests concurrently...", paths.len());
    let start = Instant::now();

    let handles: Vec<_> = paths
        .iter()
        .map(|path| {
            let client = client.clone();
            let path = path.clone();
            tokio::spawn(async move { client.generator().generate("GET", &path).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        match handle.await? {
            Ok(id) => ids.push(id),
            Err(e) => eprintln!("Error signing request: {}", e),
        }
    }

    let elapsed = start.elapsed();

    println!("\n=== Results ===");
    println!("Signed {} requests in {:?}", ids.len(), elapsed);
    println!(
        "Throughput: {:.0} signatures/sec",
        ids.len() as f64 / elapsed.as_secs_f64()
    );

    for (i, id) in ids.iter().take(5).enumerate() {
        println!("[{}] {}", i + 1, id);
    }

    let metrics = client.generator().metrics();
    println!(
        "\nGenerator: {} generations, {} cache hits, {} refresh attempt(s)",
        metrics.total_generations, metrics.cache_hits, metrics.refresh_attempts
    );

    Ok(())
}
