//! Streaming chat example.
//!
//! Run with:
//! ```bash
//! export CORTEX_API_URL="http://localhost:5000"
//! export CORTEX_API_TOKEN="your-jwt"
//! cargo run --example stream_chat -- "Write a haiku about Rust programming."
//! ```

use std::io::Write;

use cortexai::client::CortexClient;
use cortexai::model::ChatRequest;
use cortexai::stream::StreamHandler;
use tracing_subscriber::EnvFilter;

/// Prints deltas as they arrive.
struct Printer;

impl StreamHandler for Printer {
    fn on_content(&mut self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    fn on_image(&mut self, data: &str) {
        println!("\n[generated image, {} bytes]", data.len());
    }

    fn on_complete(&mut self, _text: &str) {
        println!("\n\n=== Stream Complete ===");
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("\nError in stream: {}", message);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Write a haiku about Rust programming.".to_string());

    let client = CortexClient::from_env()?;

    let health = client.health().await?;
    println!("Backend status: {}", health.status);

    let request = ChatRequest::new(prompt);
    let reply = client.stream_message(&request, &mut Printer).await?;
    println!("Response length: {} characters", reply.chars().count());

    Ok(())
}
