//! Read-side demultiplexer.
//!
//! One loop owns the input stream. Each iteration reads exactly one
//! header, validates it, reads the payload, and hands the response to
//! the registry. A success response parks the loop on the body gate
//! until the caller finishes parsing, so the loop can never run ahead of
//! body consumption.

use std::sync::{Arc, atomic::Ordering};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, ReadHalf};

use super::{ConnectionState, TransportInner};
use crate::{
    error::TransportError,
    frame::{FrameHeader, HEADER_SIZE},
    response::CompleteOutcome,
    stream::TransportStream,
};

enum LoopExit {
    /// Stop or shutdown was requested.
    Stopped,
    /// The peer closed the connection or the read failed.
    Eof(std::io::Error),
    /// A checksum, header validation, or frame-size-limit failure;
    /// framing can no longer be trusted.
    Fatal(TransportError),
}

pub(crate) async fn run(inner: Arc<TransportInner>, mut reader: ReadHalf<TransportStream>) {
    let exit = read_frames(&inner, &mut reader).await;
    inner.input_eof.store(true, Ordering::Release);
    match exit {
        LoopExit::Stopped => {}
        LoopExit::Eof(e) => {
            tracing::debug!(error = %e, "input stream ended");
            inner.fail_connection();
        }
        LoopExit::Fatal(e) => {
            tracing::warn!(error = %e, "failing connection");
            inner.fail_connection();
        }
    }
    {
        let mut state = inner.state_mut();
        if *state == ConnectionState::Closing {
            *state = ConnectionState::Closed;
        }
    }
    inner.probe.set_connected(false);
}

async fn read_frames(
    inner: &Arc<TransportInner>,
    reader: &mut ReadHalf<TransportStream>,
) -> LoopExit {
    let payload_limit = inner.config.max_inbound_payload_bytes();
    let mut header_buf = [0u8; HEADER_SIZE];
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return LoopExit::Stopped,
            res = reader.read_exact(&mut header_buf) => {
                if let Err(e) = res {
                    return LoopExit::Eof(e);
                }
            }
        }
        inner.probe.add_bytes_received(HEADER_SIZE as u64);

        let header = match FrameHeader::decode(&header_buf) {
            Ok(header) => header,
            Err(e) => return LoopExit::Fatal(e),
        };

        // Bound what the peer can make this loop allocate: a declared
        // length above the cap is rejected before any buffer exists,
        // and the frame cannot be skipped either, so the connection
        // fails.
        let declared = header.payload_size as usize;
        if declared > payload_limit {
            return LoopExit::Fatal(TransportError::OversizedPayload {
                declared,
                limit: payload_limit,
            });
        }

        let mut payload = vec![0u8; declared];
        if !payload.is_empty() {
            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => return LoopExit::Stopped,
                res = reader.read_exact(&mut payload) => {
                    if let Err(e) = res {
                        return LoopExit::Eof(e);
                    }
                }
            }
            inner.probe.add_bytes_received(payload.len() as u64);
        }
        if let Err(e) = header.verify_payload(&payload) {
            return LoopExit::Fatal(e);
        }

        match inner.registry.complete(header, Bytes::from(payload)) {
            CompleteOutcome::Delivered(gate) => {
                // Hold off the next header until the caller has parsed
                // the body (or dropped the context).
                tokio::select! {
                    biased;
                    () = inner.cancel.cancelled() => return LoopExit::Stopped,
                    _ = gate => {}
                }
            }
            CompleteOutcome::Failed => {}
            CompleteOutcome::Orphaned => {
                tracing::debug!(
                    correlation_id = header.correlation_id,
                    "dropping reply for retired correlation ID"
                );
                inner.probe.orphaned_response();
            }
        }
    }
}
