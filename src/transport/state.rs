//! Connection lifecycle states.

use std::fmt;

/// Lifecycle of one transport instance.
///
/// Only `Disconnected` and `Closed` are terminal; a caller wanting to
/// reconnect discards the instance and builds a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state; `connect` has not been called.
    Disconnected,
    /// `connect` is establishing the socket and TLS session.
    Connecting,
    /// The receive loop is running and sends are accepted.
    Connected,
    /// Stop or a connection failure is in progress.
    Closing,
    /// All resources are released.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
