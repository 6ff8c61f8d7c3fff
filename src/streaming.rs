//! Response contexts handed to callers by the receive loop.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::{error::TransportError, frame::FrameHeader};

/// A response whose header has arrived and whose body is ready to parse.
///
/// The receive loop will not read the next frame header until this
/// context signals that the body has been consumed, preserving the
/// loop/caller handoff order. Call [`StreamingContext::signal_body_parse`]
/// once parsing is done; dropping the context releases the loop as well,
/// so an abandoned caller cannot wedge the connection.
#[derive(Debug)]
pub struct StreamingContext {
    header: FrameHeader,
    body: Bytes,
    release: Option<oneshot::Sender<()>>,
}

impl StreamingContext {
    pub(crate) fn new(header: FrameHeader, body: Bytes, release: oneshot::Sender<()>) -> Self {
        Self {
            header,
            body,
            release: Some(release),
        }
    }

    /// The response frame header.
    #[must_use]
    pub fn header(&self) -> &FrameHeader { &self.header }

    /// Decompress and return the response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::CorruptedPayload`] if the body fails to
    /// decompress.
    pub fn body(&self) -> Result<Bytes, TransportError> {
        self.header.compression.decompress(&self.body)
    }

    /// Release the receive loop to read the next frame.
    pub fn signal_body_parse(mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }
}

impl Drop for StreamingContext {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            let _ = release.send(());
        }
    }
}

/// A fully parsed typed response.
#[derive(Debug)]
pub struct ClientContext<T> {
    header: FrameHeader,
    /// The decoded response value.
    pub data: T,
}

impl<T> ClientContext<T> {
    pub(crate) fn new(header: FrameHeader, data: T) -> Self { Self { header, data } }

    /// Header of the response frame this value was parsed from.
    #[must_use]
    pub fn header(&self) -> &FrameHeader { &self.header }

    /// Consume the context, returning the decoded value.
    pub fn into_data(self) -> T { self.data }
}
