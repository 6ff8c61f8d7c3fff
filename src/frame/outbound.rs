//! Staging buffer for an outbound request frame.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::TransportError,
    frame::{Compression, FrameHeader, HEADER_SIZE},
};

/// Default threshold below which payloads are never compressed.
pub const DEFAULT_MIN_COMPRESSION_BYTES: usize = 1024;

/// An outbound request frame under construction.
///
/// Callers serialize their payload into [`OutboundFrame::buffer_mut`],
/// set the method ID and compression policy, and hand the frame to the
/// transport, which assigns the correlation ID and encodes the wire
/// bytes.
#[derive(Debug, Default)]
pub struct OutboundFrame {
    buffer: BytesMut,
    method_id: u32,
    flags: u64,
    compression: Compression,
    min_compression_bytes: usize,
}

impl OutboundFrame {
    /// Create an empty frame with compression disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            method_id: 0,
            flags: 0,
            compression: Compression::None,
            min_compression_bytes: DEFAULT_MIN_COMPRESSION_BYTES,
        }
    }

    /// Mutable access to the payload staging buffer.
    pub fn buffer_mut(&mut self) -> &mut BytesMut { &mut self.buffer }

    /// Set the method the request addresses.
    pub fn set_method_id(&mut self, method_id: u32) { self.method_id = method_id; }

    /// Set the request flags carried in the metadata word.
    pub fn set_flags(&mut self, flags: u64) { self.flags = flags; }

    /// Select the compression algorithm for this frame.
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    /// Set the size threshold a payload must exceed to be compressed.
    pub fn set_min_compression_bytes(&mut self, min: usize) {
        self.min_compression_bytes = min;
    }

    /// Current payload size, before compression.
    #[must_use]
    pub fn payload_len(&self) -> usize { self.buffer.len() }

    /// Upper bound on the frame's wire size, used for the memory
    /// reservation. Compression can only shrink the payload.
    #[must_use]
    pub fn reserve_size(&self) -> usize { HEADER_SIZE + self.buffer.len() }

    /// Encode the frame into wire bytes under the given correlation ID.
    ///
    /// The configured compression is applied only when the payload is
    /// strictly larger than the threshold; smaller payloads go out
    /// unchanged and tagged uncompressed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Payload`] if the compressor fails.
    pub fn encode(self, correlation_id: u32) -> Result<Bytes, TransportError> {
        let (compression, payload) =
            if self.compression != Compression::None && self.buffer.len() > self.min_compression_bytes {
                let compressed = self
                    .compression
                    .compress(&self.buffer)
                    .map_err(|e| TransportError::Payload(Box::new(e)))?;
                (self.compression, Bytes::from(compressed))
            } else {
                (Compression::None, self.buffer.freeze())
            };
        if u32::try_from(payload.len()).is_err() {
            return Err(TransportError::Payload(
                format!("payload of {} bytes exceeds the frame size field", payload.len()).into(),
            ));
        }

        let header = FrameHeader::for_request(
            compression,
            &payload,
            self.flags,
            correlation_id,
            self.method_id,
        );
        let mut wire = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        wire.put_slice(&header.encode());
        wire.put_slice(&payload);
        Ok(wire.freeze())
    }
}
