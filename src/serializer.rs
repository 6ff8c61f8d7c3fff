//! Payload serialization capabilities.
//!
//! The transport is generic over how payloads are produced and consumed:
//! a request type serializes itself into the outbound staging buffer and
//! a response type parses itself from the response body. Both hooks are
//! async so implementations backed by reflection tables or streaming
//! sources can suspend mid-serialization; the transport's in-flight
//! queue keeps wire order correct across such suspensions.
//!
//! `bincode` is the default mechanism: any type implementing
//! [`bincode::Encode`]/[`bincode::Decode`] gets both capabilities via
//! the blanket implementations below.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::error::PayloadError;

/// Serialize a request payload into the outbound staging buffer.
#[async_trait]
pub trait EncodePayload {
    /// Append this value's wire representation to `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    async fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), PayloadError>;
}

/// Parse a response payload from a (decompressed) body.
#[async_trait]
pub trait DecodePayload: Sized {
    /// Decode a value from the response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be parsed into this type.
    async fn decode_payload(body: Bytes) -> Result<Self, PayloadError>;
}

#[async_trait]
impl<T> EncodePayload for T
where
    T: bincode::Encode + Sync,
{
    async fn encode_payload(&self, buf: &mut BytesMut) -> Result<(), PayloadError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())?;
        buf.extend_from_slice(&encoded);
        Ok(())
    }
}

#[async_trait]
impl<T> DecodePayload for T
where
    T: bincode::Decode<()> + Send,
{
    async fn decode_payload(body: Bytes) -> Result<Self, PayloadError> {
        let (value, consumed) =
            bincode::decode_from_slice(&body, bincode::config::standard())?;
        if consumed != body.len() {
            return Err(format!(
                "trailing bytes after payload: consumed {consumed} of {}",
                body.len()
            )
            .into());
        }
        Ok(value)
    }
}
