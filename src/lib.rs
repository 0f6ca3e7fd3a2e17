//! # cortexai - CortexAI chat backend client
//!
//! An async Rust client for the CortexAI chat backend, built around an
//! incremental decoder for its streamed replies.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Streaming replies decoded frame by frame, with reassembly across reads,
//!   tolerance for malformed frames and an overall timeout
//! - Typed REST calls for authentication, conversations, models, image
//!   generation and health
//!
//! ## Architecture
//!
//! - **`stream`**: [`StreamSession`](stream::StreamSession) state and the
//!   [`decode`](stream::decode) loop, usable with any byte stream
//! - **`sse`**: line framing and frame classification
//! - **`client`**: [`CortexClient`] over reqwest
//! - **`options`**: transport configuration
//!
//! ## Example
//! ```no_run
//! use cortexai::client::CortexClient;
//! use cortexai::model::ChatRequest;
//! use cortexai::options::TransportOptions;
//! use cortexai::stream::Callbacks;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = CortexClient::new(
//!         TransportOptions::new("http://localhost:5000").with_token("jwt-token"),
//!     )?;
//!
//!     let mut callbacks = Callbacks::new()
//!         .with_content(|delta| print!("{}", delta))
//!         .with_image(|_| println!("[image]"))
//!         .with_error(|message| eprintln!("error: {}", message));
//!
//!     let reply = client
//!         .stream_message(&ChatRequest::new("Hello!"), &mut callbacks)
//!         .await?;
//!     println!("\n{} bytes", reply.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod model;
pub mod options;
pub mod sse;
pub mod stream;

// Re-exports for convenience
pub use client::{ClientError, CortexClient};
pub use model::{ChatRequest, StreamEvent};
pub use stream::{decode, Callbacks, StreamError, StreamHandler, StreamSession};
