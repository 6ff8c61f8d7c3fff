//! Write-side request path: reservation, ordering, and dispatch.

use std::sync::{Arc, atomic::Ordering};

use futures::future;
use tokio::{
    sync::OwnedSemaphorePermit,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{ConnectionState, Transport, TransportInner};
use crate::{
    config::SendOptions,
    error::TransportError,
    frame::OutboundFrame,
    response::{Reservation, ResponseHandle},
    serializer::{DecodePayload, EncodePayload},
    streaming::{ClientContext, StreamingContext},
};

impl Transport {
    /// Send an encoded frame and await its response context.
    ///
    /// The call acquires a byte reservation against the memory budget
    /// (cooperatively blocking while the budget is exhausted), assigns
    /// the submission sequence and correlation ID, queues the frame, and
    /// kicks the dispatcher. The returned context carries the response
    /// header and body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ShuttingDown`] once the transport is
    /// stopping, [`TransportError::ClientRequestTimeout`] when the
    /// deadline expires before a reservation or a response,
    /// [`TransportError::ExceededMemoryBudget`] when the requested
    /// reservation can never fit, and
    /// [`TransportError::DisconnectedEndpoint`] when the connection is
    /// lost before the reply arrives.
    pub async fn send(
        &self,
        frame: OutboundFrame,
        opts: SendOptions,
    ) -> Result<StreamingContext, TransportError> {
        let seq = self.inner().next_seq();
        self.inner().do_send(seq, frame, opts).await
    }

    /// Serialize `req`, send it under `method_id`, and parse the typed
    /// response.
    ///
    /// The submission sequence is taken before serialization starts, so
    /// two `send_typed` calls issued in order hit the wire in that order
    /// even when the first serialization suspends.
    ///
    /// # Errors
    ///
    /// Everything [`Transport::send`] returns, plus
    /// [`TransportError::Payload`] when the payload capability fails and
    /// the per-request status errors mapped from the response header.
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
        let inner = self.inner();
        let seq = inner.next_seq();
        let mut frame = OutboundFrame::new();
        frame.set_method_id(method_id);
        frame.set_compression(
            opts.compression
                .unwrap_or_else(|| inner.config.default_compression()),
        );
        frame.set_min_compression_bytes(opts.effective_min_compression_bytes());
        req.encode_payload(frame.buffer_mut())
            .await
            .map_err(TransportError::Payload)?;

        let ctx = inner.do_send(seq, frame, opts).await?;
        let header = *ctx.header();
        let body = ctx.body()?;
        let data = Out::decode_payload(body)
            .await
            .map_err(TransportError::Payload)?;
        ctx.signal_body_parse();
        Ok(ClientContext::new(header, data))
    }
}

impl TransportInner {
    pub(crate) fn next_seq(&self) -> u64 { self.seq.fetch_add(1, Ordering::Relaxed) + 1 }

    pub(crate) async fn do_send(
        self: &Arc<Self>,
        seq: u64,
        frame: OutboundFrame,
        opts: SendOptions,
    ) -> Result<StreamingContext, TransportError> {
        self.probe.request();
        if *self.state_mut() != ConnectionState::Connected {
            self.probe.request_error(TransportError::ShuttingDown.kind());
            return Err(TransportError::ShuttingDown);
        }

        let budget = self.config.memory_budget();
        let requested = frame
            .reserve_size()
            .min(opts.max_reservation.unwrap_or(budget));
        if requested > budget {
            let err = TransportError::ExceededMemoryBudget { requested, budget };
            self.probe.request_error(err.kind());
            return Err(err);
        }

        let permit = match self.acquire_reservation(requested, &opts).await {
            Ok(permit) => permit,
            Err(err) => {
                self.probe.request_error(err.kind());
                return Err(err);
            }
        };
        let reservation =
            Reservation::new(Some(permit), requested as u64, Arc::clone(&self.probe));
        let (correlation_id, handle) = self.registry.reserve(reservation);

        let encoded = match frame.encode(correlation_id) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.registry.retire(correlation_id);
                self.probe.request_error(err.kind());
                return Err(err);
            }
        };
        let send_span = tracing::debug_span!(
            "transport.send",
            correlation_id,
            frame.bytes = encoded.len()
        );
        self.queue.insert(seq, encoded);
        self.dispatch_send();
        self.await_response(handle, &opts)
            .instrument(send_span)
            .await
    }

    /// Acquire `requested` bytes against the memory budget, bounded by
    /// the call's deadline and cancellation token.
    async fn acquire_reservation(
        self: &Arc<Self>,
        requested: usize,
        opts: &SendOptions,
    ) -> Result<OwnedSemaphorePermit, TransportError> {
        let permits = u32::try_from(requested).map_err(|_| TransportError::ExceededMemoryBudget {
            requested,
            budget: self.config.memory_budget(),
        })?;
        tokio::select! {
            biased;
            permit = Arc::clone(&self.memory).acquire_many_owned(permits) => {
                permit.map_err(|_| TransportError::ShuttingDown)
            }
            () = self.cancel.cancelled() => Err(TransportError::ShuttingDown),
            () = wait_cancelled(opts.cancel.clone()) => Err(TransportError::ShuttingDown),
            () = wait_deadline(opts.deadline) => {
                self.probe.request_timeout();
                Err(TransportError::ClientRequestTimeout)
            }
        }
    }

    /// Await the pending slot, racing the deadline and cancellation.
    ///
    /// Whichever resolution removes the slot first wins: a timeout that
    /// fails to retire the slot means the response already landed, so
    /// the response is returned instead.
    async fn await_response(
        self: &Arc<Self>,
        handle: ResponseHandle,
        opts: &SendOptions,
    ) -> Result<StreamingContext, TransportError> {
        enum Winner {
            Response(Result<StreamingContext, TransportError>),
            TransportClosed,
            Cancelled,
            Deadline,
        }

        let ResponseHandle {
            correlation_id,
            mut rx,
        } = handle;
        let winner = tokio::select! {
            biased;
            res = &mut rx => Winner::Response(
                res.unwrap_or_else(|_| Err(TransportError::disconnected())),
            ),
            () = self.cancel.cancelled() => Winner::TransportClosed,
            () = wait_cancelled(opts.cancel.clone()) => Winner::Cancelled,
            () = wait_deadline(opts.deadline) => Winner::Deadline,
        };
        let interrupted = match winner {
            Winner::Response(result) => return result,
            Winner::TransportClosed => TransportError::disconnected(),
            Winner::Cancelled => TransportError::ShuttingDown,
            Winner::Deadline => TransportError::ClientRequestTimeout,
        };
        if self.registry.retire(correlation_id) {
            if matches!(interrupted, TransportError::ClientRequestTimeout) {
                self.probe.request_timeout();
            }
            self.probe.request_error(interrupted.kind());
            Err(interrupted)
        } else {
            // The race was lost to a real resolution; take it instead.
            rx.await
                .unwrap_or_else(|_| Err(TransportError::disconnected()))
        }
    }

    /// Kick the dispatcher. A no-op while a drain is already running.
    pub(crate) fn dispatch_send(self: &Arc<Self>) {
        if !self.queue.begin_drain() {
            return;
        }
        let inner = Arc::clone(self);
        self.tracker.spawn(async move { inner.drain_queue().await });
    }

    /// Move ready frames into the batched output, lowest sequence first,
    /// with one flush per drain. The drain observes connection-wide
    /// cancellation so a stalled socket cannot block `stop`.
    async fn drain_queue(self: Arc<Self>) {
        loop {
            let mut wrote = false;
            while let Some(frame) = self.queue.pop_ready() {
                let len = frame.len() as u64;
                if self.write_frame(&frame).await.is_err() {
                    let _ = self.queue.finish_drain();
                    return;
                }
                self.probe.add_bytes_sent(len);
                wrote = true;
            }
            if wrote && self.flush_output().await.is_err() {
                let _ = self.queue.finish_drain();
                return;
            }
            if self.queue.finish_drain() {
                return;
            }
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<(), ()> {
        let written = {
            let mut guard = self.output.lock().await;
            let Some(output) = guard.as_mut() else {
                self.queue.clear();
                return Err(());
            };
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(()),
                res = output.write(frame) => res,
            }
        };
        written.map_err(|e| {
            tracing::warn!(error = %e, "write failed, failing connection");
            self.fail_connection();
        })
    }

    async fn flush_output(&self) -> Result<(), ()> {
        let flushed = {
            let mut guard = self.output.lock().await;
            let Some(output) = guard.as_mut() else {
                return Err(());
            };
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(()),
                res = output.flush() => res,
            }
        };
        flushed.map_err(|e| {
            tracing::warn!(error = %e, "flush failed, failing connection");
            self.fail_connection();
        })
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => future::pending().await,
    }
}

async fn wait_cancelled(token: Option<CancellationToken>) {
    match token {
        Some(token) => token.cancelled_owned().await,
        None => future::pending().await,
    }
}
