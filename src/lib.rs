//! # chatrelay
//!
//! A streaming relay between a website chat widget and an OpenAI-compatible
//! chat-completion API, plus the client side of the exchange.
//!
//! The widget posts `{"message": "..."}` to `POST /api/chat`. The relay
//! forwards the message with a fixed system instruction, then re-frames the
//! provider's stream as `data: {"content": "..."}` records on a chunked
//! response.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatrelay::config::{Config, UpstreamConfig};
//! use chatrelay::relay;
//! use chatrelay::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new(UpstreamConfig::new(std::env::var("OPENAI_API_KEY")?));
//!     config.validate()?;
//!
//!     let server = Server::bind(&config.listen).await?;
//!     server.serve(relay::app(&config)?).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod http;
pub mod llm;
pub mod middleware;
pub mod relay;
pub mod router;
pub mod security;
pub mod server;
pub mod sse;

pub use client::{ChatSession, Conversation, RelayClient, Turn};
pub use config::{Config, ConfigError, UpstreamConfig};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use relay::{Relay, RelayError};
pub use router::Router;
pub use server::{Server, ServerError};
