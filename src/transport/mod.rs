//! Transport core: socket ownership, connection lifecycle, and request
//! orchestration.
//!
//! One [`Transport`] owns one connection. `connect` establishes TCP
//! (optionally TLS) and starts the receive loop; `send`/`send_typed`
//! schedule frames under the memory budget, preserving submission order
//! through the in-flight queue; `stop`/`shutdown` close the send gate,
//! fail outstanding requests, and release every resource acquired during
//! connect.

mod receive;
mod send;
mod state;

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use tokio::{
    io::ReadHalf,
    net::TcpStream,
    sync::Semaphore,
};
use tokio_rustls::{TlsConnector, rustls::pki_types::ServerName};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

pub use state::ConnectionState;

use crate::{
    config::TransportConfig,
    error::TransportError,
    metrics::{ClientProbe, ProbeSnapshot},
    output::BatchedOutput,
    queue::InFlightQueue,
    response::ResponseRegistry,
    stream::TransportStream,
};

/// Client-side RPC transport over one multiplexed connection.
///
/// Cloning is cheap and shares the underlying connection; protocol
/// facades hold clones rather than references.
///
/// # Examples
///
/// ```no_run
/// use framelink::{SendOptions, Transport, TransportConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), framelink::TransportError> {
/// let addr = "127.0.0.1:33145".parse().expect("valid socket address");
/// let transport = Transport::new(TransportConfig::new(addr));
/// transport.connect().await?;
/// let _reply: framelink::ClientContext<String> = transport
///     .send_typed(&"status".to_owned(), 7, SendOptions::new())
///     .await?;
/// transport.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

pub(crate) struct TransportInner {
    pub(crate) config: TransportConfig,
    pub(crate) probe: Arc<ClientProbe>,
    pub(crate) state: Mutex<ConnectionState>,
    pub(crate) memory: Arc<Semaphore>,
    pub(crate) registry: ResponseRegistry,
    pub(crate) queue: InFlightQueue,
    pub(crate) seq: AtomicU64,
    pub(crate) output: tokio::sync::Mutex<Option<BatchedOutput>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) tracker: TaskTracker,
    pub(crate) input_eof: AtomicBool,
}

impl Transport {
    /// Create a transport in the `disconnected` state.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let probe = Arc::new(ClientProbe::new(
            config.service_name(),
            config.metrics_disabled(),
        ));
        let memory = Arc::new(Semaphore::new(config.memory_budget()));
        let registry = ResponseRegistry::new(Arc::clone(&probe));
        Self {
            inner: Arc::new(TransportInner {
                config,
                probe,
                state: Mutex::new(ConnectionState::Disconnected),
                memory,
                registry,
                queue: InFlightQueue::new(),
                seq: AtomicU64::new(0),
                output: tokio::sync::Mutex::new(None),
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                input_eof: AtomicBool::new(false),
            }),
        }
    }

    /// Open the connection and start the receive loop.
    ///
    /// Must be called exactly once per instance.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DisconnectedEndpoint`] if the socket
    /// cannot be opened, [`TransportError::Tls`] if the handshake fails,
    /// and [`TransportError::ShuttingDown`] if this instance already
    /// left the `disconnected` state.
    pub async fn connect(&self) -> Result<(), TransportError> {
        {
            let mut state = self.inner.state_mut();
            if *state != ConnectionState::Disconnected {
                return Err(TransportError::ShuttingDown);
            }
            *state = ConnectionState::Connecting;
        }
        let connect_span = tracing::info_span!(
            "transport.connect",
            peer.addr = %self.inner.config.server_addr()
        );
        match self.establish().instrument(connect_span).await {
            Ok(reader) => {
                let raced_with_stop = {
                    let mut state = self.inner.state_mut();
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Connected;
                        false
                    } else {
                        true
                    }
                };
                if raced_with_stop {
                    *self.inner.output.lock().await = None;
                    return Err(TransportError::ShuttingDown);
                }
                self.inner.probe.set_connected(true);
                let inner = Arc::clone(&self.inner);
                self.inner.tracker.spawn(receive::run(inner, reader));
                tracing::debug!(
                    peer.addr = %self.inner.config.server_addr(),
                    "connected"
                );
                Ok(())
            }
            Err(err) => {
                *self.inner.state_mut() = ConnectionState::Closed;
                Err(err)
            }
        }
    }

    async fn establish(&self) -> Result<ReadHalf<TransportStream>, TransportError> {
        let addr = self.inner.config.server_addr();
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::DisconnectedEndpoint(Some(e)))?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(peer.addr = %addr, error = %e, "failed to set TCP_NODELAY");
        }
        let stream = match self.inner.config.tls() {
            None => TransportStream::Plain(tcp),
            Some(tls) => {
                let server_name = match &tls.sni_hostname {
                    Some(host) => ServerName::try_from(host.clone()).map_err(|e| {
                        TransportError::Tls(io::Error::new(io::ErrorKind::InvalidInput, e))
                    })?,
                    None => ServerName::IpAddress(addr.ip().into()),
                };
                let connector = TlsConnector::from(Arc::clone(&tls.config));
                let session = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(TransportError::Tls)?;
                TransportStream::Tls(Box::new(session))
            }
        };
        let (reader, writer) = tokio::io::split(stream);
        *self.inner.output.lock().await = Some(BatchedOutput::new(writer));
        Ok(reader)
    }

    /// Stop the transport gracefully and release all resources.
    ///
    /// Closes the send gate (new sends fail with
    /// [`TransportError::ShuttingDown`]), fails outstanding requests
    /// with [`TransportError::DisconnectedEndpoint`], waits for the
    /// receive loop and any running dispatch to finish, then closes the
    /// socket. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state_mut();
            match *state {
                ConnectionState::Disconnected => {
                    *state = ConnectionState::Closed;
                    return;
                }
                ConnectionState::Closed => return,
                ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Closing => *state = ConnectionState::Closing,
            }
        }
        self.inner.cancel.cancel();
        self.inner.memory.close();
        self.inner.queue.clear();
        self.inner.registry.fail_all(TransportError::disconnected);
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        if let Some(mut output) = self.inner.output.lock().await.take() {
            let _ = output.close().await;
        }
        *self.inner.state_mut() = ConnectionState::Closed;
        self.inner.probe.set_connected(false);
        tracing::info!(
            peer.addr = %self.inner.config.server_addr(),
            "transport stopped"
        );
    }

    /// Immediate shutdown; safe to call from a signal context.
    ///
    /// Cancels pending reads and writes and fails outstanding requests
    /// without waiting for anything to drain. `stop` remains the way to
    /// release the socket deterministically.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state_mut();
            match *state {
                ConnectionState::Disconnected => {
                    *state = ConnectionState::Closed;
                    return;
                }
                ConnectionState::Closed => return,
                _ => *state = ConnectionState::Closing,
            }
        }
        self.inner.cancel.cancel();
        self.inner.memory.close();
        self.inner.queue.clear();
        self.inner.registry.fail_all(TransportError::disconnected);
    }

    /// Whether the socket is open and the input stream has not reached
    /// EOF.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self.inner.state_mut() == ConnectionState::Connected
            && !self.inner.input_eof.load(Ordering::Acquire)
    }

    /// Address of the configured server.
    #[must_use]
    pub fn server_address(&self) -> SocketAddr { self.inner.config.server_addr() }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { *self.inner.state_mut() }

    /// Copy of the probe's counters.
    #[must_use]
    pub fn probe_snapshot(&self) -> ProbeSnapshot { self.inner.probe.snapshot() }

    pub(crate) fn inner(&self) -> &Arc<TransportInner> { &self.inner }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("server_addr", &self.inner.config.server_addr())
            .field("state", &*self.inner.state_mut())
            .finish_non_exhaustive()
    }
}

impl TransportInner {
    pub(crate) fn state_mut(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().expect("state lock")
    }

    /// Tear the connection down after an unrequested failure.
    ///
    /// Idempotent: only the first caller moves the state to `Closing`
    /// and fails the outstanding requests; later callers return
    /// immediately.
    pub(crate) fn fail_connection(&self) {
        {
            let mut state = self.state_mut();
            match *state {
                ConnectionState::Connecting | ConnectionState::Connected => {
                    *state = ConnectionState::Closing;
                }
                _ => return,
            }
        }
        self.probe.connection_reset();
        self.memory.close();
        self.queue.clear();
        self.registry.fail_all(TransportError::disconnected);
        self.cancel.cancel();
    }
}
