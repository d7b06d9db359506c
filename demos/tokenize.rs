//! Tokenizes a test card number against the live vault and prints the log trail.
use paylike_client::{CallOptions, Client, MemorySink, MulticastSink, TracingSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let client = Client::builder().build()?;
    let trail = MemorySink::new();
    let opts = CallOptions::new().log(MulticastSink::new(TracingSink, trail.clone()));

    match client.tokenize_with("pcn", "4100000000000000", opts).await {
        Ok(token) => println!("token: {token}"),
        Err(err) => println!("tokenization failed ({}): {err}", err.name()),
    }

    println!("\n=== Log trail ===");
    for record in trail.records() {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
