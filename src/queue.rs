//! Ordered queue of encoded frames awaiting wire-write.
//!
//! Sequence numbers are assigned at caller entry, before payload
//! serialization runs, so frames can be enqueued out of order when one
//! serialization suspends and a later call overtakes it. The queue
//! restores submission order by draining strictly consecutive sequences:
//! a gap means an earlier frame is still being serialized, and the drain
//! stops until it arrives.

use std::{collections::BTreeMap, sync::Mutex};

use bytes::Bytes;

struct QueueInner {
    entries: BTreeMap<u64, Bytes>,
    last_sent: u64,
    draining: bool,
}

/// In-flight queue shared between senders and the dispatcher.
pub(crate) struct InFlightQueue {
    inner: Mutex<QueueInner>,
}

impl InFlightQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                entries: BTreeMap::new(),
                last_sent: 0,
                draining: false,
            }),
        }
    }

    /// Enqueue an encoded frame under its submission sequence.
    pub(crate) fn insert(&self, seq: u64, frame: Bytes) {
        let mut inner = self.inner.lock().expect("queue lock");
        inner.entries.insert(seq, frame);
    }

    /// Claim the drain. Returns `false` when a drain is already running,
    /// making dispatch idempotently re-entrant.
    pub(crate) fn begin_drain(&self) -> bool {
        let mut inner = self.inner.lock().expect("queue lock");
        if inner.draining {
            return false;
        }
        inner.draining = true;
        true
    }

    /// Pop the next frame if it is exactly the successor of the last
    /// dispatched sequence.
    pub(crate) fn pop_ready(&self) -> Option<Bytes> {
        let mut inner = self.inner.lock().expect("queue lock");
        let (&seq, _) = inner.entries.first_key_value()?;
        if seq != inner.last_sent + 1 {
            return None;
        }
        inner.last_sent = seq;
        inner.entries.remove(&seq)
    }

    /// Release the drain claim. Returns `true` when the drain may end;
    /// `false` means a ready frame arrived while releasing and the
    /// caller must drain again (the claim is retained).
    pub(crate) fn finish_drain(&self) -> bool {
        let mut inner = self.inner.lock().expect("queue lock");
        let next_ready = inner
            .entries
            .first_key_value()
            .is_some_and(|(&seq, _)| seq == inner.last_sent + 1);
        if next_ready {
            return false;
        }
        inner.draining = false;
        true
    }

    /// Drop all queued frames; used on shutdown.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock().expect("queue lock");
        inner.entries.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize { self.inner.lock().expect("queue lock").entries.len() }
}
