//! Frame layer: a 4-byte little-endian length prefix around a payload.
//!
//! Mirrors a plain length-prefixed TCP framing: `send` writes the prefix and
//! payload and flushes; `recv` reads a complete payload or a "closed"
//! sentinel (`Ok(None)`) on a clean disconnect, a short read mid-frame, or a
//! declared length over `max_frame_length` — none of these are surfaced to
//! the caller as errors, matching a peer that simply went away.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{CodecError, Result};

/// Default cap on an individual frame's payload length (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 1 << 20;

/// A length-prefixed frame reader/writer over an async byte stream.
pub struct FrameIo<S> {
    stream: S,
    max_frame_length: u32,
    closed: bool,
}

impl<S> FrameIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream`, bounding frames to [`DEFAULT_MAX_FRAME_LENGTH`].
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_length(stream, DEFAULT_MAX_FRAME_LENGTH)
    }

    /// Wrap `stream`, bounding frames to `max_frame_length`.
    pub fn with_max_frame_length(stream: S, max_frame_length: u32) -> Self {
        Self { stream, max_frame_length, closed: false }
    }

    /// Receive the next complete frame payload.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection, a short
    /// read occurs mid-frame, or the declared length exceeds
    /// `max_frame_length` — in every such case the connection is marked
    /// closed and no further reads are attempted.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Io`] for I/O failures other than a clean or
    /// truncated disconnect.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        if self.closed {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        match self.stream.read_exact(&mut len_bytes).await {
            Ok(_) => {},
            Err(err) if is_disconnect(&err) => {
                self.closed = true;
                return Ok(None);
            },
            Err(err) => {
                self.closed = true;
                return Err(err.into());
            },
        }

        let len = u32::from_le_bytes(len_bytes);
        if len > self.max_frame_length {
            self.closed = true;
            return Ok(None);
        }

        let mut payload = vec![0u8; len as usize];
        match self.stream.read_exact(&mut payload).await {
            Ok(_) => Ok(Some(Bytes::from(payload))),
            Err(err) if is_disconnect(&err) => {
                self.closed = true;
                Ok(None)
            },
            Err(err) => {
                self.closed = true;
                Err(err.into())
            },
        }
    }

    /// Send `payload` as a complete frame, flushing before returning.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Io`] on write failure, or
    /// [`CodecError::LengthOverrun`] if `payload` cannot fit a `uint32`
    /// length prefix.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::LengthOverrun { declared: u32::MAX, remaining: 0 })?;
        self.stream.write_all(&len.to_le_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Idempotently mark this endpoint closed; further `recv` calls return
    /// `Ok(None)` without touching the underlying stream.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether this endpoint has observed a close condition.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn round_trip_single_frame() {
        let (client, server) = duplex(4096);
        let mut client = FrameIo::new(client);
        let mut server = FrameIo::new(server);

        client.send(b"hello").await.unwrap();
        let received = server.recv().await.unwrap();
        assert_eq!(received.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn empty_payload_round_trip() {
        let (client, server) = duplex(4096);
        let mut client = FrameIo::new(client);
        let mut server = FrameIo::new(server);

        client.send(b"").await.unwrap();
        let received = server.recv().await.unwrap();
        assert_eq!(received.as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn clean_close_yields_none() {
        let (client, server) = duplex(4096);
        let mut server = FrameIo::new(server);
        drop(client);

        assert_eq!(server.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn short_read_mid_frame_yields_none() {
        let (mut client, server) = duplex(4096);
        let mut server = FrameIo::new(server);

        // Claim a 10-byte payload but only provide 3, then disconnect.
        client.write_all(&10u32.to_le_bytes()).await.unwrap();
        client.write_all(&[1, 2, 3]).await.unwrap();
        drop(client);

        assert_eq!(server.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversize_frame_closes_without_payload() {
        let (mut client, server) = duplex(8192);
        let mut server = FrameIo::with_max_frame_length(server, 16);

        client.write_all(&1024u32.to_le_bytes()).await.unwrap();
        client.write_all(&vec![0u8; 1024]).await.unwrap();

        assert_eq!(server.recv().await.unwrap(), None);
        assert!(server.is_closed());
    }

    #[tokio::test]
    async fn frames_split_across_arbitrary_boundaries_reassemble() {
        let (mut client, server) = duplex(65536);
        let mut server = FrameIo::new(server);

        let payload = vec![0x42u8; 5000];
        let len = (payload.len() as u32).to_le_bytes();
        let mut wire = Vec::new();
        wire.extend_from_slice(&len);
        wire.extend_from_slice(&payload);

        let writer = tokio::spawn(async move {
            for chunk in wire.chunks(17) {
                client.write_all(chunk).await.unwrap();
            }
        });

        let received = server.recv().await.unwrap();
        writer.await.unwrap();
        assert_eq!(received.as_deref(), Some(&payload[..]));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_suppresses_further_recv() {
        let (_client, server) = duplex(4096);
        let mut server = FrameIo::new(server);
        server.close();
        server.close();
        assert_eq!(server.recv().await.unwrap(), None);
    }
}
