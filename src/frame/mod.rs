//! Wire frame codec: fixed-size headers, checksums, and payload
//! compression.

mod compression;
mod header;
mod outbound;

pub use compression::Compression;
pub use header::{
    CHECKSUM_TYPE_CRC32,
    FrameHeader,
    HEADER_SIZE,
    ResponseStatus,
    TRANSPORT_VERSION,
};
pub use outbound::{DEFAULT_MIN_COMPRESSION_BYTES, OutboundFrame};
