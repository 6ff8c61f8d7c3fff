//! Client probe and metric helpers.
//!
//! The probe keeps its counts in atomics so callers and tests can always
//! observe them via [`ClientProbe::snapshot`]. When the optional
//! `metrics` Cargo feature is enabled and metrics are not disabled in
//! the transport configuration, every update is mirrored to the
//! [`metrics`](https://docs.rs/metrics) facade, labelled with the
//! configured service name.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

/// Counter of requests handed to the transport.
pub const REQUESTS_TOTAL: &str = "framelink_requests_total";
/// Counter of responses matched to an outstanding request.
pub const RESPONSES_TOTAL: &str = "framelink_responses_total";
/// Counter of request errors, labelled by error kind.
pub const REQUEST_ERRORS_TOTAL: &str = "framelink_request_errors_total";
/// Counter of per-call timeouts.
pub const REQUEST_TIMEOUTS_TOTAL: &str = "framelink_request_timeouts_total";
/// Counter of bytes written to the socket.
pub const BYTES_SENT_TOTAL: &str = "framelink_bytes_sent_total";
/// Counter of bytes read from the socket.
pub const BYTES_RECEIVED_TOTAL: &str = "framelink_bytes_received_total";
/// Counter of connections lost outside a requested stop.
pub const CONNECTION_RESETS_TOTAL: &str = "framelink_connection_resets_total";
/// Counter of responses whose correlation ID had already been retired.
pub const ORPHANED_RESPONSES_TOTAL: &str = "framelink_orphaned_responses_total";
/// Gauge of requests awaiting a response.
pub const IN_FLIGHT_REQUESTS: &str = "framelink_in_flight_requests";
/// Gauge of bytes currently reserved against the memory budget.
pub const MEMORY_BYTES_HELD: &str = "framelink_memory_bytes_held";
/// Gauge set to 1 while the transport is connected.
pub const CONNECTED: &str = "framelink_connected";
/// Histogram of end-to-end request latency in seconds.
pub const REQUEST_DURATION_SECONDS: &str = "framelink_request_duration_seconds";

const UNLABELLED_SERVICE: &str = "unknown";

/// Point-in-time copy of the probe's counters, for tests and callers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    /// Requests handed to the transport.
    pub requests_sent: u64,
    /// Responses matched to an outstanding request.
    pub responses_received: u64,
    /// Request errors of any kind.
    pub request_errors: u64,
    /// Per-call timeouts.
    pub request_timeouts: u64,
    /// Bytes written to the socket.
    pub bytes_sent: u64,
    /// Bytes read from the socket.
    pub bytes_received: u64,
    /// Connections lost outside a requested stop.
    pub connection_resets: u64,
    /// Responses dropped because their correlation ID was retired.
    pub orphaned_responses: u64,
    /// Requests currently awaiting a response.
    pub in_flight: u64,
    /// Bytes currently reserved against the memory budget.
    pub memory_bytes_held: u64,
}

/// Request/response counters and gauges for one transport.
#[derive(Debug)]
pub struct ClientProbe {
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "label only reaches the facade"))]
    service: String,
    #[cfg_attr(not(feature = "metrics"), expect(dead_code, reason = "gates facade emission only"))]
    emit: bool,
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    request_errors: AtomicU64,
    request_timeouts: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    connection_resets: AtomicU64,
    orphaned_responses: AtomicU64,
    in_flight: AtomicU64,
    memory_bytes_held: AtomicU64,
    connected: AtomicBool,
}

impl ClientProbe {
    /// Create a probe labelled with `service_name`.
    ///
    /// When `disabled` is set, nothing is emitted to the metrics facade;
    /// the atomic counters remain observable either way.
    #[must_use]
    pub fn new(service_name: Option<&str>, disabled: bool) -> Self {
        Self {
            service: service_name.unwrap_or(UNLABELLED_SERVICE).to_owned(),
            emit: !disabled,
            requests_sent: AtomicU64::new(0),
            responses_received: AtomicU64::new(0),
            request_errors: AtomicU64::new(0),
            request_timeouts: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            connection_resets: AtomicU64::new(0),
            orphaned_responses: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            memory_bytes_held: AtomicU64::new(0),
            connected: AtomicBool::new(false),
        }
    }

    /// Record a request entering the transport.
    pub fn request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(REQUESTS_TOTAL, "service" => self.service.clone()).increment(1);
        }
    }

    /// Record a response matched to an outstanding request, with its
    /// end-to-end latency.
    pub fn response(&self, latency: Duration) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(RESPONSES_TOTAL, "service" => self.service.clone()).increment(1);
            metrics::histogram!(REQUEST_DURATION_SECONDS, "service" => self.service.clone())
                .record(latency.as_secs_f64());
        }
        #[cfg(not(feature = "metrics"))]
        let _ = latency;
    }

    /// Record a request error by kind.
    pub fn request_error(&self, kind: &'static str) {
        self.request_errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(
                REQUEST_ERRORS_TOTAL,
                "service" => self.service.clone(),
                "kind" => kind
            )
            .increment(1);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = kind;
    }

    /// Record a per-call timeout.
    pub fn request_timeout(&self) {
        self.request_timeouts.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(REQUEST_TIMEOUTS_TOTAL, "service" => self.service.clone())
                .increment(1);
        }
    }

    /// Record bytes written to the socket.
    pub fn add_bytes_sent(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(BYTES_SENT_TOTAL, "service" => self.service.clone())
                .increment(count);
        }
    }

    /// Record bytes read from the socket.
    pub fn add_bytes_received(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(BYTES_RECEIVED_TOTAL, "service" => self.service.clone())
                .increment(count);
        }
    }

    /// Record a connection lost outside a requested stop.
    pub fn connection_reset(&self) {
        self.connection_resets.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(CONNECTION_RESETS_TOTAL, "service" => self.service.clone())
                .increment(1);
        }
    }

    /// Record a response whose correlation ID had already been retired.
    pub fn orphaned_response(&self) {
        self.orphaned_responses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::counter!(ORPHANED_RESPONSES_TOTAL, "service" => self.service.clone())
                .increment(1);
        }
    }

    /// A request entered the in-flight set.
    pub fn request_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::gauge!(IN_FLIGHT_REQUESTS, "service" => self.service.clone()).increment(1.0);
        }
    }

    /// A request left the in-flight set.
    pub fn request_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::gauge!(IN_FLIGHT_REQUESTS, "service" => self.service.clone()).decrement(1.0);
        }
    }

    /// Bytes reserved against the memory budget.
    pub fn memory_reserved(&self, bytes: u64) {
        self.memory_bytes_held.fetch_add(bytes, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::gauge!(MEMORY_BYTES_HELD, "service" => self.service.clone())
                .increment(bytes as f64);
        }
    }

    /// Bytes returned to the memory budget.
    pub fn memory_released(&self, bytes: u64) {
        self.memory_bytes_held.fetch_sub(bytes, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::gauge!(MEMORY_BYTES_HELD, "service" => self.service.clone())
                .decrement(bytes as f64);
        }
    }

    /// Flip the connected gauge.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        #[cfg(feature = "metrics")]
        if self.emit {
            metrics::gauge!(CONNECTED, "service" => self.service.clone())
                .set(if connected { 1.0 } else { 0.0 });
        }
    }

    /// Whether the connected gauge is set.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> ProbeSnapshot {
        ProbeSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            request_timeouts: self.request_timeouts.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connection_resets: self.connection_resets.load(Ordering::Relaxed),
            orphaned_responses: self.orphaned_responses.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            memory_bytes_held: self.memory_bytes_held.load(Ordering::Relaxed),
        }
    }
}
