//! Payload compression codecs and their wire tags.

use std::io;

use bytes::Bytes;

use crate::error::TransportError;

/// Zstd compression level used for outbound payloads.
const ZSTD_LEVEL: i32 = 3;

/// Compression algorithm applied to a frame payload.
///
/// The wire tag is a 4-byte little-endian word in the frame header. A
/// frame whose payload stayed below the compression threshold is tagged
/// [`Compression::None`] regardless of the configured policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// Payload bytes are carried verbatim.
    #[default]
    None,
    /// LZ4 block format with a length prefix.
    Lz4,
    /// Zstandard frame format.
    Zstd,
}

impl Compression {
    /// Wire tag for this algorithm.
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    /// Decode a wire tag.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::CorruptedHeader`] for an unknown tag; an
    /// unrecognised algorithm means the header cannot be trusted.
    pub fn from_tag(tag: u32) -> Result<Self, TransportError> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Lz4),
            2 => Ok(Self::Zstd),
            other => Err(TransportError::CorruptedHeader(format!(
                "unknown compression tag {other}"
            ))),
        }
    }

    /// Compress `payload` with this algorithm.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the underlying encoder fails.
    pub fn compress(self, payload: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Self::None => Ok(payload.to_vec()),
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(payload)),
            Self::Zstd => zstd::stream::encode_all(payload, ZSTD_LEVEL),
        }
    }

    /// Decompress `payload` according to this algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::CorruptedPayload`] if the compressed
    /// stream cannot be decoded.
    pub fn decompress(self, payload: &[u8]) -> Result<Bytes, TransportError> {
        match self {
            Self::None => Ok(Bytes::copy_from_slice(payload)),
            Self::Lz4 => lz4_flex::decompress_size_prepended(payload)
                .map(Bytes::from)
                .map_err(|e| TransportError::CorruptedPayload(format!("lz4: {e}"))),
            Self::Zstd => zstd::stream::decode_all(payload)
                .map(Bytes::from)
                .map_err(|e| TransportError::CorruptedPayload(format!("zstd: {e}"))),
        }
    }
}
