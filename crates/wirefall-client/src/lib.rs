//! Wirefall Client
//!
//! A resilient RPC client. Callers invoke arbitrarily-named remote methods;
//! the client routes each call over a persistent WebSocket channel when one
//! is available, and falls back to one-shot HTTP POST exchanges when it is
//! not. All of this is transparent, with retry, backoff, and reconnection policy.
//!
//! # Architecture
//!
//! - [`config`]: configuration surface and resolution (base URL, transport
//!   mode, timeouts, retry policy, credential lookup)
//! - [`backoff`]: failure bookkeeping that gates channel reconnect attempts
//! - [`channel`]: the persistent WebSocket driver, multiplexing concurrent
//!   calls over one connection by correlation id
//! - [`http`]: the stateless fallback driver with class-sensitive retries
//! - [`manager`]: the per-call transport decision and fallback state machine
//! - [`client`]: the caller-facing proxy surface
//!
//! # Example
//!
//! ```no_run
//! use wirefall_client::{ClientOptions, WirefallClient};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WirefallClient::new(
//!     ClientOptions::new().base_url("https://rpc.example.com"),
//! )?;
//!
//! // Any method name dispatches remotely
//! let result = client.call("listDocuments", vec![json!({"limit": 10})]).await?;
//! println!("{result}");
//!
//! // Query-shaped calls go through the template transform
//! let statement = wirefall_client::sql(
//!     &["SELECT * FROM docs WHERE id = ", ""],
//!     vec![json!(7)],
//! )?;
//! let rows = client.query(statement).await?;
//! println!("{rows}");
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod channel;
pub mod client;
pub mod config;
pub mod http;
pub mod manager;

pub use client::{MethodHandle, WirefallClient};
pub use config::{ClientConfig, ClientOptions, RetryConfig, TransportMode};
pub use manager::{ActiveTransport, TransportChange};
pub use wirefall_common::{sql, NamedTemplate, Result, Statement, WirefallError};
