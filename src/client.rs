//! Thin typed facade over one transport.

use std::net::SocketAddr;

use crate::{
    config::{SendOptions, TransportConfig},
    error::TransportError,
    metrics::ProbeSnapshot,
    serializer::{DecodePayload, EncodePayload},
    streaming::ClientContext,
    transport::Transport,
};

/// A client bound to one transport instance.
///
/// The facade stays deliberately thin: connection pooling, retries, and
/// endpoint selection belong to the caller. Protocol-specific helper
/// structs compose over the shared transport:
///
/// ```no_run
/// use framelink::{Client, ClientContext, SendOptions, Transport, TransportConfig};
///
/// struct MetadataApi {
///     transport: Transport,
/// }
///
/// impl MetadataApi {
///     async fn cluster_info(&self) -> Result<ClientContext<String>, framelink::TransportError> {
///         self.transport
///             .send_typed(&"cluster_info".to_owned(), 12, SendOptions::new())
///             .await
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), framelink::TransportError> {
/// let addr = "127.0.0.1:33145".parse().expect("valid socket address");
/// let client = Client::new(TransportConfig::new(addr));
/// client.connect().await?;
/// let api = MetadataApi {
///     transport: client.transport().clone(),
/// };
/// let info = api.cluster_info().await?;
/// println!("{}", info.data);
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    transport: Transport,
}

impl Client {
    /// Create a disconnected client for the given configuration.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            transport: Transport::new(config),
        }
    }

    /// Connect the underlying transport.
    ///
    /// # Errors
    ///
    /// See [`Transport::connect`].
    pub async fn connect(&self) -> Result<(), TransportError> { self.transport.connect().await }

    /// Serialize `req`, send it under `method_id`, and parse the typed
    /// response.
    ///
    /// # Errors
    ///
    /// See [`Transport::send_typed`].
    pub async fn send_typed<In, Out>(
        &self,
        req: &In,
        method_id: u32,
        opts: SendOptions,
    ) -> Result<ClientContext<Out>, TransportError>
    where
        In: EncodePayload + ?Sized,
        Out: DecodePayload,
    {
        self.transport.send_typed(req, method_id, opts).await
    }

    /// Stop the transport gracefully. Idempotent.
    pub async fn stop(&self) { self.transport.stop().await; }

    /// Immediate shutdown; safe from a signal context.
    pub fn shutdown(&self) { self.transport.shutdown(); }

    /// Whether the connection is open and readable.
    #[must_use]
    pub fn is_valid(&self) -> bool { self.transport.is_valid() }

    /// Address of the configured server.
    #[must_use]
    pub fn server_address(&self) -> SocketAddr { self.transport.server_address() }

    /// The underlying transport, for protocol facades that compose over
    /// it.
    #[must_use]
    pub fn transport(&self) -> &Transport { &self.transport }

    /// Copy of the transport probe's counters.
    #[must_use]
    pub fn probe_snapshot(&self) -> ProbeSnapshot { self.transport.probe_snapshot() }
}
