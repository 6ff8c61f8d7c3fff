//! Correlation registry for pending responses.
//!
//! Every outstanding request owns exactly one slot keyed by correlation
//! ID. A slot is removed by exactly one of: successful dispatch, status
//! failure, per-call timeout/cancellation (retire), or connection
//! failure (`fail_all`). The oneshot channel underneath guarantees a
//! slot can never resolve twice.

use std::{collections::HashMap, sync::Arc, sync::Mutex};

use bytes::Bytes;
use tokio::{
    sync::{OwnedSemaphorePermit, oneshot},
    time::Instant,
};

use crate::{
    error::TransportError,
    frame::FrameHeader,
    metrics::ClientProbe,
    streaming::StreamingContext,
};

/// Bytes reserved against the memory budget for one request.
///
/// Dropping the reservation returns the permits to the semaphore and
/// rolls the memory gauge back, so every slot-removal path releases the
/// budget without bookkeeping at the call sites.
#[derive(Debug)]
pub(crate) struct Reservation {
    _permit: Option<OwnedSemaphorePermit>,
    bytes: u64,
    probe: Arc<ClientProbe>,
}

impl Reservation {
    pub(crate) fn new(
        permit: Option<OwnedSemaphorePermit>,
        bytes: u64,
        probe: Arc<ClientProbe>,
    ) -> Self {
        probe.memory_reserved(bytes);
        Self {
            _permit: permit,
            bytes,
            probe,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) { self.probe.memory_released(self.bytes); }
}

/// Caller-side handle for one pending response.
#[derive(Debug)]
pub(crate) struct ResponseHandle {
    pub(crate) correlation_id: u32,
    pub(crate) rx: oneshot::Receiver<Result<StreamingContext, TransportError>>,
}

/// Result of handing a response frame to the registry.
#[derive(Debug)]
pub(crate) enum CompleteOutcome {
    /// A success response was delivered; the receive loop must wait on
    /// this gate before reading the next frame header.
    Delivered(oneshot::Receiver<()>),
    /// A failure status resolved the slot; there is no body to parse.
    Failed,
    /// No slot holds this correlation ID; the reply arrived after a
    /// timeout retired it.
    Orphaned,
}

struct PendingSlot {
    tx: oneshot::Sender<Result<StreamingContext, TransportError>>,
    started_at: Instant,
    _reservation: Reservation,
}

struct RegistryInner {
    slots: HashMap<u32, PendingSlot>,
    next_id: u32,
}

/// Map from correlation ID to pending-response slot.
pub(crate) struct ResponseRegistry {
    inner: Mutex<RegistryInner>,
    probe: Arc<ClientProbe>,
}

impl ResponseRegistry {
    pub(crate) fn new(probe: Arc<ClientProbe>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                slots: HashMap::new(),
                next_id: 0,
            }),
            probe,
        }
    }

    /// Allocate a fresh correlation ID and install a pending slot.
    ///
    /// IDs wrap at `u32::MAX` and skip any ID still held by a live
    /// request, so an outstanding request can never be shadowed.
    pub(crate) fn reserve(&self, reservation: Reservation) -> (u32, ResponseHandle) {
        let (tx, rx) = oneshot::channel();
        let correlation_id = {
            let mut inner = self.inner.lock().expect("registry lock");
            let mut id = inner.next_id;
            loop {
                id = id.wrapping_add(1);
                if !inner.slots.contains_key(&id) {
                    break;
                }
            }
            inner.next_id = id;
            inner.slots.insert(
                id,
                PendingSlot {
                    tx,
                    started_at: Instant::now(),
                    _reservation: reservation,
                },
            );
            id
        };
        self.probe.request_started();
        (
            correlation_id,
            ResponseHandle {
                correlation_id,
                rx,
            },
        )
    }

    /// Resolve the slot for `header.correlation_id` with a response.
    ///
    /// A success status delivers a [`StreamingContext`] carrying `body`;
    /// any other status resolves the slot with the mapped error.
    pub(crate) fn complete(&self, header: FrameHeader, body: Bytes) -> CompleteOutcome {
        let Some(slot) = self.take_slot(header.correlation_id) else {
            return CompleteOutcome::Orphaned;
        };
        self.probe.response(slot.started_at.elapsed());
        match header.status().to_error() {
            None => {
                let (gate_tx, gate_rx) = oneshot::channel();
                let ctx = StreamingContext::new(header, body, gate_tx);
                if slot.tx.send(Ok(ctx)).is_err() {
                    tracing::debug!(
                        correlation_id = header.correlation_id,
                        "response delivered to an abandoned caller"
                    );
                }
                CompleteOutcome::Delivered(gate_rx)
            }
            Some(err) => {
                self.probe.request_error(err.kind());
                let _ = slot.tx.send(Err(err));
                CompleteOutcome::Failed
            }
        }
    }

    /// Remove a slot without resolving it; used when the caller's
    /// deadline or cancellation fires first. Returns whether the slot
    /// was still present.
    pub(crate) fn retire(&self, correlation_id: u32) -> bool {
        self.take_slot(correlation_id).is_some()
    }

    /// Resolve every outstanding slot with an error from `make_err`.
    pub(crate) fn fail_all(&self, make_err: impl Fn() -> TransportError) {
        let slots = {
            let mut inner = self.inner.lock().expect("registry lock");
            std::mem::take(&mut inner.slots)
        };
        for (_, slot) in slots {
            self.probe.request_finished();
            let err = make_err();
            self.probe.request_error(err.kind());
            let _ = slot.tx.send(Err(err));
        }
    }

    /// Number of requests awaiting a response.
    pub(crate) fn outstanding(&self) -> usize {
        self.inner.lock().expect("registry lock").slots.len()
    }

    fn take_slot(&self, correlation_id: u32) -> Option<PendingSlot> {
        let slot = {
            let mut inner = self.inner.lock().expect("registry lock");
            inner.slots.remove(&correlation_id)
        };
        if slot.is_some() {
            self.probe.request_finished();
        }
        slot
    }

    #[cfg(test)]
    fn set_next_id(&self, next_id: u32) {
        self.inner.lock().expect("registry lock").next_id = next_id;
    }
}
