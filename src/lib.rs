//! Client-side RPC transport for a multiplexed streaming protocol.
//!
//! One [`Transport`] owns one TCP (optionally TLS) connection and
//! multiplexes request/response pairs over it: frames carry a fixed
//! CRC-protected header with a correlation ID, payloads are compressed
//! per call once they cross a size threshold, submission order is
//! preserved on the wire across concurrent senders, and total in-flight
//! bytes are bounded by a memory budget.
//!
//! Connection pooling, reconnection, and retry are deliberately left to
//! the caller: a transport that loses its connection is discarded and
//! replaced.
//!
//! # Examples
//!
//! ```no_run
//! use framelink::{Client, SendOptions, TransportConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), framelink::TransportError> {
//! let addr = "127.0.0.1:33145".parse().expect("valid socket address");
//! let client = Client::new(
//!     TransportConfig::new(addr).with_service_name("metadata"),
//! );
//! client.connect().await?;
//! let pong: framelink::ClientContext<String> = client
//!     .send_typed(&"PING".to_owned(), 42, SendOptions::new())
//!     .await?;
//! assert_eq!(pong.data, "PONG");
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod metrics;
mod output;
mod queue;
mod response;
pub mod serializer;
mod stream;
pub mod streaming;
pub mod transport;

pub use client::Client;
pub use config::{SendOptions, TlsOptions, TransportConfig};
pub use error::{PayloadError, TransportError};
pub use frame::{Compression, FrameHeader, OutboundFrame, ResponseStatus};
pub use metrics::{ClientProbe, ProbeSnapshot};
pub use serializer::{DecodePayload, EncodePayload};
pub use streaming::{ClientContext, StreamingContext};
pub use transport::{ConnectionState, Transport};
