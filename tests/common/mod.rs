//! Shared utilities for integration tests.
//!
//! Provides a minimal wire-speaking peer: helpers to read request
//! frames from a socket and to write response frames back, so each test
//! can script exact server behaviour over a loopback listener.
#![allow(
    unfulfilled_lint_expectations,
    reason = "each integration test binary uses a different subset of these helpers"
)]

use std::io;

use framelink::frame::{Compression, FrameHeader, HEADER_SIZE};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// One request frame as received off the wire.
#[derive(Debug)]
#[expect(
    dead_code,
    reason = "shared across integration test binaries that each use a subset"
)]
pub struct RawFrame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// Read one frame (header + payload) from `stream`.
#[expect(
    dead_code,
    reason = "shared across integration test binaries that each use a subset"
)]
pub async fn read_frame(stream: &mut TcpStream) -> io::Result<RawFrame> {
    let mut header_buf = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header_buf).await?;
    let header = FrameHeader::decode(&header_buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut payload = vec![0u8; header.payload_size as usize];
    stream.read_exact(&mut payload).await?;
    header
        .verify_payload(&payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(RawFrame { header, payload })
}

/// Write a response frame with the given status and raw payload.
#[expect(
    dead_code,
    reason = "shared across integration test binaries that each use a subset"
)]
pub async fn write_response(
    stream: &mut TcpStream,
    correlation_id: u32,
    status: u64,
    payload: &[u8],
) -> io::Result<()> {
    write_response_compressed(stream, correlation_id, status, payload, Compression::None).await
}

/// Write a response frame whose payload is already compressed with
/// `compression`.
#[expect(
    dead_code,
    reason = "shared across integration test binaries that each use a subset"
)]
pub async fn write_response_compressed(
    stream: &mut TcpStream,
    correlation_id: u32,
    status: u64,
    payload: &[u8],
    compression: Compression,
) -> io::Result<()> {
    let header = FrameHeader::for_request(compression, payload, status, correlation_id, 0);
    stream.write_all(&header.encode()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

/// Encode a value with the transport's default payload mechanism.
#[expect(
    dead_code,
    reason = "shared across integration test binaries that each use a subset"
)]
pub fn bincode_bytes<T: bincode::Encode>(value: &T) -> Vec<u8> {
    bincode::encode_to_vec(value, bincode::config::standard()).expect("bincode encode")
}
