//! Framed transport module
//!
//! Reads and writes length-prefixed frames over any async byte stream. The
//! connection handler splits a TCP stream and drives one [`FrameReader`] on
//! the read half and one [`FrameWriter`] on the write half.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{GridscapeError, NetworkError, Result};
use crate::protocol::frame::{Frame, FrameDecoder};

/// Initial read buffer size
const READ_BUFFER_SIZE: usize = 4096;

/// Reads frames from an async byte stream
pub struct FrameReader<R> {
    stream: R,
    buffer: BytesMut,
    decoder: FrameDecoder,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader that rejects payloads above `max_payload` bytes
    pub fn new(stream: R, max_payload: usize) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            decoder: FrameDecoder::new(max_payload),
        }
    }

    /// Read the next frame
    ///
    /// Returns `Ok(None)` when the peer closes the stream on a frame
    /// boundary. A close in the middle of a frame is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buffer)? {
                trace!(
                    msg_id = frame.msg_id,
                    len = frame.payload.len(),
                    "Frame received"
                );
                return Ok(Some(frame));
            }

            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| GridscapeError::Network(NetworkError::ReadError(e.to_string())))?;

            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(GridscapeError::Network(NetworkError::ReadError(format!(
                    "stream closed with {} bytes of an incomplete frame",
                    self.buffer.len()
                ))));
            }
        }
    }

    /// Bytes buffered but not yet decoded
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the reader and return the underlying stream
    pub fn into_inner(self) -> R {
        self.stream
    }
}

/// Writes frames to an async byte stream
pub struct FrameWriter<W> {
    stream: W,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
        }
    }

    /// Encode and write a frame, then flush
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buffer.clear();
        frame.encode_into(&mut self.buffer);

        self.stream
            .write_all(&self.buffer)
            .await
            .map_err(|e| GridscapeError::Network(NetworkError::WriteError(e.to_string())))?;
        self.stream
            .flush()
            .await
            .map_err(|e| GridscapeError::Network(NetworkError::WriteError(e.to_string())))?;

        trace!(
            msg_id = frame.msg_id,
            len = frame.payload.len(),
            "Frame sent"
        );
        Ok(())
    }

    /// Shut down the write side of the stream
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| GridscapeError::Network(NetworkError::WriteError(e.to_string())))
    }
}
