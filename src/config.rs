//! Transport configuration and per-call send options.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_rustls::rustls;
use tokio_util::sync::CancellationToken;

use crate::frame::{Compression, DEFAULT_MIN_COMPRESSION_BYTES};

/// Default cap on bytes reserved by not-yet-completed requests.
pub const DEFAULT_MEMORY_BUDGET: usize = 1024 * 1024;

/// Default cap on the payload size a response header may declare.
pub const DEFAULT_MAX_INBOUND_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// TLS settings for the client side of a connection.
///
/// Certificate loading is the caller's concern; the transport only
/// consumes a ready [`rustls::ClientConfig`].
#[derive(Clone)]
pub struct TlsOptions {
    /// Pre-built client TLS configuration.
    pub config: Arc<rustls::ClientConfig>,
    /// Server name indication override. When absent, the server's IP
    /// address is used as the SNI name.
    pub sni_hostname: Option<String>,
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("sni_hostname", &self.sni_hostname)
            .finish_non_exhaustive()
    }
}

/// Immutable configuration for the lifetime of one transport.
///
/// # Examples
///
/// ```
/// use framelink::{Compression, TransportConfig};
///
/// let addr = "127.0.0.1:9090".parse().expect("valid socket address");
/// let config = TransportConfig::new(addr)
///     .with_service_name("controller")
///     .with_default_compression(Compression::Lz4)
///     .with_memory_budget(256 * 1024);
/// assert_eq!(config.memory_budget(), 256 * 1024);
/// ```
#[derive(Clone, Debug)]
pub struct TransportConfig {
    server_addr: SocketAddr,
    tls: Option<TlsOptions>,
    disable_metrics: bool,
    service_name: Option<String>,
    default_compression: Compression,
    memory_budget: usize,
    max_inbound_payload_bytes: usize,
}

impl TransportConfig {
    /// Configuration with metrics enabled, no TLS, no compression, and
    /// the default memory budget and inbound payload cap.
    #[must_use]
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            tls: None,
            disable_metrics: false,
            service_name: None,
            default_compression: Compression::None,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            max_inbound_payload_bytes: DEFAULT_MAX_INBOUND_PAYLOAD_BYTES,
        }
    }

    /// Wrap the connection in TLS with the given options.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Disable metric registration entirely.
    #[must_use]
    pub fn with_metrics_disabled(mut self) -> Self {
        self.disable_metrics = true;
        self
    }

    /// Label metrics with a service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Default compression policy for calls that do not override it.
    #[must_use]
    pub fn with_default_compression(mut self, compression: Compression) -> Self {
        self.default_compression = compression;
        self
    }

    /// Cap the total bytes reserved by outstanding requests.
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Cap the payload size a response header may declare.
    ///
    /// A frame declaring a larger payload fails the connection before
    /// any buffer for it is allocated, bounding what a misbehaving peer
    /// can make the receive loop allocate.
    #[must_use]
    pub fn with_max_inbound_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_inbound_payload_bytes = bytes;
        self
    }

    /// Address of the server this transport connects to.
    #[must_use]
    pub fn server_addr(&self) -> SocketAddr { self.server_addr }

    /// TLS options, if the connection is to be wrapped.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsOptions> { self.tls.as_ref() }

    /// Whether metric registration is elided.
    #[must_use]
    pub fn metrics_disabled(&self) -> bool { self.disable_metrics }

    /// Metrics label for this transport.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> { self.service_name.as_deref() }

    /// Default compression policy.
    #[must_use]
    pub fn default_compression(&self) -> Compression { self.default_compression }

    /// Total in-flight byte budget.
    #[must_use]
    pub fn memory_budget(&self) -> usize { self.memory_budget }

    /// Largest payload size accepted from the peer.
    #[must_use]
    pub fn max_inbound_payload_bytes(&self) -> usize { self.max_inbound_payload_bytes }
}

/// Per-call options accepted by `send` and `send_typed`.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// Deadline for the whole call: memory reservation, wire write, and
    /// response arrival. Expiry resolves the call with
    /// `client_request_timeout`.
    pub deadline: Option<Instant>,
    /// Cancellation token for the call; cancelling resolves the call
    /// with `shutting_down`.
    pub cancel: Option<CancellationToken>,
    /// Compression override; `None` uses the transport default.
    pub compression: Option<Compression>,
    /// Size a payload must exceed before compression is applied.
    pub min_compression_bytes: Option<usize>,
    /// Cap on the byte reservation for this call. Defaults to the whole
    /// memory budget, so oversized frames reserve the full budget and
    /// queue behind other requests instead of failing.
    pub max_reservation: Option<usize>,
}

impl SendOptions {
    /// Options with no deadline, no cancellation, and transport-default
    /// compression.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Set the deadline to `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Override the transport's default compression for this call.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Override the compression threshold for this call.
    #[must_use]
    pub fn with_min_compression_bytes(mut self, min: usize) -> Self {
        self.min_compression_bytes = Some(min);
        self
    }

    /// Cap the byte reservation for this call.
    #[must_use]
    pub fn with_max_reservation(mut self, bytes: usize) -> Self {
        self.max_reservation = Some(bytes);
        self
    }

    pub(crate) fn effective_min_compression_bytes(&self) -> usize {
        self.min_compression_bytes.unwrap_or(DEFAULT_MIN_COMPRESSION_BYTES)
    }
}
