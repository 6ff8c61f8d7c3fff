//! Error types for transport operations.

use std::io;

use thiserror::Error;

/// Boxed error type used by the payload capability traits.
pub type PayloadError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by transport operations.
///
/// Every request resolves with either a typed response or exactly one of
/// these variants. Per-request failures (`ClientRequestTimeout`,
/// `MethodNotFound`, `ServerError`) leave the connection usable; framing
/// failures (`CorruptedHeader`, `CorruptedPayload`) tear the whole
/// connection down because frame boundaries have been lost.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The remote endpoint is not reachable or the connection was lost.
    #[error("disconnected endpoint")]
    DisconnectedEndpoint(#[source] Option<io::Error>),
    /// The TLS handshake with the endpoint failed.
    #[error("TLS handshake failed")]
    Tls(#[source] io::Error),
    /// The per-call deadline expired before a response arrived, or before
    /// a memory reservation could be acquired.
    #[error("request timed out")]
    ClientRequestTimeout,
    /// The server replied with a status this client cannot interpret.
    #[error("service error")]
    ServiceError,
    /// The server does not expose the requested method.
    #[error("method not found")]
    MethodNotFound,
    /// The server reported an internal failure for this request.
    #[error("server error")]
    ServerError,
    /// The transport is stopping and no longer accepts requests.
    #[error("transport is shutting down")]
    ShuttingDown,
    /// A frame header failed validation; the connection is no longer
    /// synchronised with the peer.
    #[error("corrupted frame header: {0}")]
    CorruptedHeader(String),
    /// A frame payload failed checksum or decompression.
    #[error("corrupted frame payload: {0}")]
    CorruptedPayload(String),
    /// The requested byte reservation can never be satisfied by the
    /// configured memory budget.
    #[error("reservation of {requested} bytes exceeds memory budget of {budget} bytes")]
    ExceededMemoryBudget {
        /// Bytes the call asked to reserve.
        requested: usize,
        /// Total budget configured on the transport.
        budget: usize,
    },
    /// The peer declared a payload larger than the inbound cap; the
    /// frame is rejected before any buffer for it is allocated.
    #[error("peer declared a payload of {declared} bytes, above the inbound limit of {limit} bytes")]
    OversizedPayload {
        /// Payload length declared in the frame header.
        declared: usize,
        /// Configured inbound payload cap.
        limit: usize,
    },
    /// The caller-supplied payload capability failed to encode or decode.
    #[error("payload codec error")]
    Payload(#[source] PayloadError),
}

impl TransportError {
    /// Stable label for the error kind, used by the probe's per-kind
    /// error counters.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DisconnectedEndpoint(_) => "disconnected_endpoint",
            Self::Tls(_) => "tls_error",
            Self::ClientRequestTimeout => "client_request_timeout",
            Self::ServiceError => "service_error",
            Self::MethodNotFound => "method_not_found",
            Self::ServerError => "server_error",
            Self::ShuttingDown => "shutting_down",
            Self::CorruptedHeader(_) => "corrupted_header",
            Self::CorruptedPayload(_) => "corrupted_payload",
            Self::ExceededMemoryBudget { .. } => "exceeded_memory_budget",
            Self::OversizedPayload { .. } => "oversized_payload",
            Self::Payload(_) => "payload_error",
        }
    }

    /// Build a `DisconnectedEndpoint` without an underlying I/O cause.
    #[must_use]
    pub(crate) fn disconnected() -> Self { Self::DisconnectedEndpoint(None) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(TransportError::disconnected().kind(), "disconnected_endpoint");
        assert_eq!(TransportError::ClientRequestTimeout.kind(), "client_request_timeout");
        assert_eq!(
            TransportError::ExceededMemoryBudget {
                requested: 2,
                budget: 1
            }
            .kind(),
            "exceeded_memory_budget"
        );
        assert_eq!(
            TransportError::OversizedPayload {
                declared: 2,
                limit: 1
            }
            .kind(),
            "oversized_payload"
        );
    }

    #[test]
    fn disconnected_preserves_io_source() {
        let err = TransportError::DisconnectedEndpoint(Some(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        let source = std::error::Error::source(&err).expect("io source");
        assert!(source.to_string().contains("refused"));
    }
}
