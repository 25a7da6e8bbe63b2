//! Length-prefixed framing.
//!
//! Every unit on the wire is a 4-byte big-endian length `L` followed by
//! exactly `L` payload bytes. `L = 0` is legal and carries an empty payload.
//!
//! The reader and writer halves are independent so that the read side of a
//! connection can live in its handler task while the write side is shared
//! with whoever broadcasts to that peer.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec, LengthDelimitedCodecError};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Largest length a 4-byte prefix can declare
const UNBOUNDED_FRAME_LENGTH: usize = u32::MAX as usize;

/// Builds the codec for the relay wire format.
///
/// `max_frame_length` of `None` accepts any length the prefix can express.
fn codec(max_frame_length: Option<usize>) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_offset(0)
        .length_field_length(LENGTH_PREFIX_BYTES)
        .length_adjustment(0)
        .big_endian()
        .max_frame_length(max_frame_length.unwrap_or(UNBOUNDED_FRAME_LENGTH))
        .new_codec()
}

/// Read half of a framed channel.
pub struct FrameReader<R> {
    inner: FramedRead<R, LengthDelimitedCodec>,
    max_frame_length: Option<usize>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a byte stream with no frame length cap.
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_length(reader, None)
    }

    /// Wraps a byte stream, rejecting frames that declare more than
    /// `max_frame_length` payload bytes.
    pub fn with_max_frame_length(reader: R, max_frame_length: Option<usize>) -> Self {
        Self {
            inner: FramedRead::new(reader, codec(max_frame_length)),
            max_frame_length,
        }
    }

    /// Receives the next complete frame payload.
    ///
    /// End of stream, clean or in the middle of a frame, is reported as an
    /// error like any other transport failure.
    pub async fn recv_frame(&mut self) -> Result<Bytes, ChannelError> {
        match self.inner.next().await {
            Some(Ok(payload)) => Ok(payload.freeze()),
            Some(Err(e)) => Err(ChannelError::from_io(e, self.max_frame_length)),
            None => Err(ChannelError::Closed),
        }
    }
}

/// Write half of a framed channel.
pub struct FrameWriter<W> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
    max_frame_length: Option<usize>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wraps a byte sink with no frame length cap.
    pub fn new(writer: W) -> Self {
        Self::with_max_frame_length(writer, None)
    }

    /// Wraps a byte sink, refusing to send payloads longer than
    /// `max_frame_length`.
    pub fn with_max_frame_length(writer: W, max_frame_length: Option<usize>) -> Self {
        Self {
            inner: FramedWrite::new(writer, codec(max_frame_length)),
            max_frame_length,
        }
    }

    /// Sends one frame and flushes it to the underlying stream.
    pub async fn send_frame(&mut self, payload: impl Into<Bytes>) -> Result<(), ChannelError> {
        let payload: Bytes = payload.into();
        self.inner
            .send(payload)
            .await
            .map_err(|e| ChannelError::from_io(e, self.max_frame_length))
    }

    /// Flushes pending output and shuts down the write direction.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        SinkExt::<Bytes>::close(&mut self.inner)
            .await
            .map_err(|e| ChannelError::from_io(e, self.max_frame_length))
    }
}

/// Errors on a framed channel.
///
/// Callers treat every variant as "channel broken"; the variants only
/// exist so logs say why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Frame exceeds maximum length of {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("Write timeout")]
    WriteTimeout,
}

impl ChannelError {
    fn from_io(err: std::io::Error, max_frame_length: Option<usize>) -> Self {
        let too_large = err
            .get_ref()
            .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());

        if too_large {
            return ChannelError::FrameTooLarge {
                max: max_frame_length.unwrap_or(UNBOUNDED_FRAME_LENGTH),
            };
        }

        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => ChannelError::Closed,
            _ => ChannelError::Io(err.to_string()),
        }
    }
}
