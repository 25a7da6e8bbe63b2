//! Shared write side of a peer's framed channel.
//!
//! The connection handler owns the read side. The write side is reached by
//! every broadcast and may be closed by the broadcaster (failed delivery),
//! the server (shutdown) or the handler itself (teardown), so closing is
//! idempotent and also wakes the handler's blocked receive.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use relay_protocol::{ChannelError, FrameWriter};

use crate::config::ChannelSettings;

type BoxedWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Cheap-to-clone handle to a peer's outgoing frames.
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<OutboundInner>,
}

struct OutboundInner {
    /// `None` once closed
    writer: Mutex<Option<BoxedWriter>>,

    /// Cancelled on close
    closed: CancellationToken,

    write_timeout: std::time::Duration,
}

impl Outbound {
    /// Wraps the write half of a connection.
    ///
    /// Outgoing lines are not subject to the inbound frame cap, since the
    /// sender tag makes a relayed line longer than the frame it came from.
    pub fn new<W>(writer: W, settings: ChannelSettings) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            inner: Arc::new(OutboundInner {
                writer: Mutex::new(Some(FrameWriter::new(boxed))),
                closed: CancellationToken::new(),
                write_timeout: settings.write_timeout,
            }),
        }
    }

    /// Sends one frame.
    ///
    /// Concurrent senders are serialised so frames never interleave.
    pub async fn send(&self, payload: Bytes) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(ChannelError::Closed)?;

        match timeout(self.inner.write_timeout, writer.send_frame(payload)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::WriteTimeout),
        }
    }

    /// Closes the channel. Closing an already closed channel does nothing.
    pub async fn close(&self) {
        self.inner.closed.cancel();

        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            match timeout(self.inner.write_timeout, writer.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Error shutting down outbound channel"),
                Err(_) => debug!("Timed out shutting down outbound channel"),
            }
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves when the channel is closed.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::FrameReader;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_send_delivers_frame() {
        let (server, client) = duplex(1024);
        let outbound = Outbound::new(server, ChannelSettings::default());
        let mut reader = FrameReader::new(client);

        outbound.send(Bytes::from_static(b"[a] b")).await.unwrap();

        assert_eq!(reader.recv_frame().await.unwrap().as_ref(), b"[a] b");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_wakes_waiters() {
        let (server, client) = duplex(1024);
        let outbound = Outbound::new(server, ChannelSettings::default());
        let mut reader = FrameReader::new(client);

        let waiter = {
            let outbound = outbound.clone();
            tokio::spawn(async move { outbound.closed().await })
        };

        outbound.close().await;
        outbound.close().await;

        waiter.await.unwrap();
        assert!(outbound.is_closed());
        assert_eq!(
            outbound.send(Bytes::from_static(b"late")).await,
            Err(ChannelError::Closed)
        );
        // The remote side sees end of stream
        assert_eq!(reader.recv_frame().await, Err(ChannelError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_on_stalled_peer() {
        let (server, _client) = duplex(8);
        let settings = ChannelSettings {
            max_frame_length: None,
            write_timeout: Duration::from_millis(50),
        };
        let outbound = Outbound::new(server, settings);

        let result = outbound.send(Bytes::from(vec![0u8; 64])).await;
        assert_eq!(result, Err(ChannelError::WriteTimeout));
    }
}
