//! Fixed-size frame header encoding and validation.
//!
//! Every frame on the wire starts with a 34-byte little-endian header:
//!
//! ```text
//! | offset | size | field                                         |
//! |--------|------|-----------------------------------------------|
//! |      0 |    1 | version                                       |
//! |      1 |    1 | header checksum type                          |
//! |      2 |    4 | compression tag                               |
//! |      6 |    4 | payload length (post-compression)             |
//! |     10 |    8 | metadata (request: flags; response: status)   |
//! |     18 |    4 | correlation ID                                |
//! |     22 |    4 | header CRC32 over bytes [0..22)               |
//! |     26 |    4 | payload CRC32 over the payload bytes          |
//! |     30 |    4 | method ID (requests only; zero on responses)  |
//! ```
//!
//! The header CRC covers only the fields before it, so a flipped bit in
//! the length or correlation ID is caught before any payload is read.

use crate::{error::TransportError, frame::Compression};

/// Size of the fixed header on the wire.
pub const HEADER_SIZE: usize = 34;

/// Protocol version emitted and accepted by this implementation.
pub const TRANSPORT_VERSION: u8 = 1;

/// Header checksum type tag for CRC32; the only assigned value.
pub const CHECKSUM_TYPE_CRC32: u8 = 0;

/// Number of leading header bytes covered by the header CRC.
const HEADER_CRC_COVERAGE: usize = 22;

/// Response status carried in the metadata word of a response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The request was served; the payload holds the response body.
    Success,
    /// The server does not expose the requested method.
    MethodNotFound,
    /// The server gave up on the request before completing it.
    RequestTimeout,
    /// The server failed internally while serving the request.
    ServerError,
    /// A status word this client does not recognise.
    Unknown(u64),
}

impl ResponseStatus {
    /// Decode the metadata word of a response header.
    #[must_use]
    pub fn from_meta(meta: u64) -> Self {
        match meta {
            0 => Self::Success,
            1 => Self::MethodNotFound,
            2 => Self::RequestTimeout,
            3 => Self::ServerError,
            other => Self::Unknown(other),
        }
    }

    /// Map a non-success status to the error a pending request resolves
    /// with. Success maps to no error.
    #[must_use]
    pub fn to_error(self) -> Option<TransportError> {
        match self {
            Self::Success => None,
            Self::MethodNotFound => Some(TransportError::MethodNotFound),
            Self::RequestTimeout => Some(TransportError::ClientRequestTimeout),
            Self::ServerError => Some(TransportError::ServerError),
            Self::Unknown(_) => Some(TransportError::ServiceError),
        }
    }
}

/// Decoded frame header.
///
/// The same layout is used for requests and responses; `meta` holds
/// request flags or a response status, and `method_id` is zero on
/// responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version.
    pub version: u8,
    /// Header checksum type tag.
    pub checksum_type: u8,
    /// Compression applied to the payload.
    pub compression: Compression,
    /// Payload length in bytes, after compression.
    pub payload_size: u32,
    /// Request flags or response status.
    pub meta: u64,
    /// Correlates a response to its outstanding request.
    pub correlation_id: u32,
    /// CRC32 over the payload bytes as they appear on the wire.
    pub payload_checksum: u32,
    /// Requested method; zero on responses.
    pub method_id: u32,
}

impl FrameHeader {
    /// Build a request header for the given payload bytes.
    #[must_use]
    pub fn for_request(
        compression: Compression,
        payload: &[u8],
        flags: u64,
        correlation_id: u32,
        method_id: u32,
    ) -> Self {
        Self {
            version: TRANSPORT_VERSION,
            checksum_type: CHECKSUM_TYPE_CRC32,
            compression,
            payload_size: payload.len() as u32,
            meta: flags,
            correlation_id,
            payload_checksum: crc32fast::hash(payload),
            method_id,
        }
    }

    /// Response status carried in the metadata word.
    #[must_use]
    pub fn status(&self) -> ResponseStatus { ResponseStatus::from_meta(self.meta) }

    /// Encode the header, computing the header CRC.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        buf[1] = self.checksum_type;
        buf[2..6].copy_from_slice(&self.compression.tag().to_le_bytes());
        buf[6..10].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[10..18].copy_from_slice(&self.meta.to_le_bytes());
        buf[18..22].copy_from_slice(&self.correlation_id.to_le_bytes());
        let header_crc = crc32fast::hash(&buf[..HEADER_CRC_COVERAGE]);
        buf[22..26].copy_from_slice(&header_crc.to_le_bytes());
        buf[26..30].copy_from_slice(&self.payload_checksum.to_le_bytes());
        buf[30..34].copy_from_slice(&self.method_id.to_le_bytes());
        buf
    }

    /// Decode and validate a header.
    ///
    /// Validation covers the version byte, the checksum type, the
    /// compression tag, and the header CRC.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::CorruptedHeader`] on any mismatch. A
    /// corrupt header means frame boundaries are lost, so callers must
    /// fail the connection rather than skip the frame.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, TransportError> {
        let stored_crc = u32::from_le_bytes([buf[22], buf[23], buf[24], buf[25]]);
        let actual_crc = crc32fast::hash(&buf[..HEADER_CRC_COVERAGE]);
        if stored_crc != actual_crc {
            return Err(TransportError::CorruptedHeader(format!(
                "header CRC mismatch: stored {stored_crc:#010x}, computed {actual_crc:#010x}"
            )));
        }
        let version = buf[0];
        if version != TRANSPORT_VERSION {
            return Err(TransportError::CorruptedHeader(format!(
                "unsupported version {version}"
            )));
        }
        let checksum_type = buf[1];
        if checksum_type != CHECKSUM_TYPE_CRC32 {
            return Err(TransportError::CorruptedHeader(format!(
                "unsupported checksum type {checksum_type}"
            )));
        }
        let compression =
            Compression::from_tag(u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]))?;
        Ok(Self {
            version,
            checksum_type,
            compression,
            payload_size: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            meta: u64::from_le_bytes([
                buf[10], buf[11], buf[12], buf[13], buf[14], buf[15], buf[16], buf[17],
            ]),
            correlation_id: u32::from_le_bytes([buf[18], buf[19], buf[20], buf[21]]),
            payload_checksum: u32::from_le_bytes([buf[26], buf[27], buf[28], buf[29]]),
            method_id: u32::from_le_bytes([buf[30], buf[31], buf[32], buf[33]]),
        })
    }

    /// Verify the payload checksum against the wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::CorruptedPayload`] on mismatch.
    pub fn verify_payload(&self, payload: &[u8]) -> Result<(), TransportError> {
        let actual = crc32fast::hash(payload);
        if actual != self.payload_checksum {
            return Err(TransportError::CorruptedPayload(format!(
                "payload CRC mismatch: stored {:#010x}, computed {actual:#010x}",
                self.payload_checksum
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn sample_header() -> FrameHeader {
        FrameHeader::for_request(Compression::Lz4, b"sample payload", 0b1010, 77, 42)
    }

    #[test]
    fn encode_then_decode_preserves_all_fields() {
        let header = sample_header();
        let decoded = FrameHeader::decode(&header.encode()).expect("decode");
        assert_eq!(decoded, header);
    }

    #[rstest]
    #[case(0)] // version
    #[case(1)] // checksum type
    #[case(4)] // compression tag
    #[case(7)] // payload length
    #[case(12)] // metadata
    #[case(19)] // correlation ID
    #[case(23)] // the CRC itself
    fn bit_flip_in_protected_region_is_detected(#[case] offset: usize) {
        let mut buf = sample_header().encode();
        buf[offset] ^= 0x01;
        let err = FrameHeader::decode(&buf).expect_err("corruption must be detected");
        assert!(matches!(err, TransportError::CorruptedHeader(_)));
    }

    #[test]
    fn payload_checksum_rejects_altered_payload() {
        let header = sample_header();
        header.verify_payload(b"sample payload").expect("matching payload");
        let err = header
            .verify_payload(b"sample psyload")
            .expect_err("altered payload must be rejected");
        assert!(matches!(err, TransportError::CorruptedPayload(_)));
    }

    #[test]
    fn zero_length_payload_has_empty_crc() {
        let header = FrameHeader::for_request(Compression::None, b"", 0, 1, 9);
        assert_eq!(header.payload_size, 0);
        header.verify_payload(b"").expect("empty payload verifies");
    }

    #[test]
    fn status_mapping_matches_wire_codes() {
        assert_eq!(ResponseStatus::from_meta(0), ResponseStatus::Success);
        assert_eq!(ResponseStatus::from_meta(1), ResponseStatus::MethodNotFound);
        assert_eq!(ResponseStatus::from_meta(2), ResponseStatus::RequestTimeout);
        assert_eq!(ResponseStatus::from_meta(3), ResponseStatus::ServerError);
        assert!(matches!(
            ResponseStatus::from_meta(9).to_error(),
            Some(TransportError::ServiceError)
        ));
    }
}
