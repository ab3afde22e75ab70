use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use vpncore_framing::LengthPrefixedFramer;

use crate::error::TransportError;
use crate::Transport;

const READ_CHUNK: usize = 4096;

/// Wraps an already TLS-protected byte stream to the gateway. Everything
/// after the dialect's one-shot "start tunnel" request is opaque,
/// length-prefixed framed PPP bytes (§4.2); this type owns reassembly since
/// the underlying stream gives no message boundaries of its own.
pub struct StreamTransport<S> {
    inner: S,
    framer: LengthPrefixedFramer,
    recv_buf: Vec<u8>,
    closed: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(inner: S, framer: LengthPrefixedFramer) -> Self {
        Self { inner, framer, recv_buf: Vec::with_capacity(READ_CHUNK), closed: false }
    }

    /// Sends the dialect's one-shot tunnel-start request verbatim,
    /// immediately after the TLS handshake and before any framed traffic.
    pub async fn send_tunnel_request(&mut self, request: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inner.write_all(request).await?;
        Ok(())
    }

    fn try_take_frame(&mut self) -> Option<Vec<u8>> {
        let needed = self.framer.next_frame_len(&self.recv_buf)?;
        if self.recv_buf.len() < needed {
            return None;
        }
        Some(self.recv_buf.drain(..needed).collect())
    }

    /// The server doesn't reply to the tunnel-start request unless it's
    /// rejecting it (§6): waits up to `timeout` for bytes to arrive, and if
    /// any do, checks whether they look like an HTTP response rather than
    /// framed PPP traffic. Bytes that don't look like a rejection are left
    /// in `recv_buf` for the normal framer-driven `recv` to pick up, so a
    /// real PPP frame racing this peek isn't lost.
    pub async fn peek_rejection(&mut self, timeout: Duration) -> Result<Option<String>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = match tokio::time::timeout(timeout, self.inner.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                self.closed = true;
                return Err(TransportError::Closed);
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Ok(None),
        };
        self.recv_buf.extend_from_slice(&chunk[..n]);
        if self.recv_buf.starts_with(b"HTTP/") {
            let text = String::from_utf8_lossy(&self.recv_buf);
            let status_line = text.lines().next().unwrap_or(&text).to_string();
            return Ok(Some(status_line));
        }
        Ok(None)
    }
}

#[async_trait::async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inner.write_all(frame).await?;
        Ok(())
    }

    /// Returns one complete, still-framed PPP frame (length prefix
    /// included) at a time, reassembling across however many reads the
    /// underlying stream needed to deliver it.
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(frame) = self.try_take_frame() {
                return Ok(frame);
            }
            if self.closed {
                return Err(TransportError::Closed);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                self.closed = true;
                return Err(TransportError::Closed);
            }
            self.recv_buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.inner.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn framer() -> LengthPrefixedFramer {
        LengthPrefixedFramer::new(vec![0x50, 0x50], 1500)
    }

    #[tokio::test]
    async fn reassembles_a_frame_split_across_reads() {
        let (client, mut server) = duplex(8);
        let mut transport = StreamTransport::new(client, framer());
        let frame = framer().encode(0x0021, b"hello");

        let writer = tokio::spawn(async move {
            for chunk in frame.chunks(3) {
                server.write_all(chunk).await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        });

        let received = transport.recv().await.unwrap();
        let (protocol, payload) = framer().decode(&received).unwrap();
        assert_eq!(protocol, 0x0021);
        assert_eq!(payload, b"hello");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn recv_reports_closed_on_eof() {
        let (client, server) = duplex(8);
        drop(server);
        let mut transport = StreamTransport::new(client, framer());
        assert!(matches!(transport.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn peek_rejection_reports_http_status_line() {
        let (client, mut server) = duplex(64);
        let mut transport = StreamTransport::new(client, framer());
        server.write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n").await.unwrap();

        let status = transport.peek_rejection(Duration::from_millis(200)).await.unwrap();
        assert_eq!(status, Some("HTTP/1.1 403 Forbidden".to_string()));
    }

    #[tokio::test]
    async fn peek_rejection_leaves_ppp_bytes_for_recv() {
        let (client, mut server) = duplex(64);
        let mut transport = StreamTransport::new(client, framer());
        let frame = framer().encode(0x0021, b"hello");
        server.write_all(&frame).await.unwrap();

        let status = transport.peek_rejection(Duration::from_millis(200)).await.unwrap();
        assert_eq!(status, None);

        let received = transport.recv().await.unwrap();
        let (protocol, payload) = framer().decode(&received).unwrap();
        assert_eq!(protocol, 0x0021);
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn peek_rejection_times_out_quietly_when_nothing_arrives() {
        let (client, _server) = duplex(64);
        let mut transport = StreamTransport::new(client, framer());
        let status = transport.peek_rejection(Duration::from_millis(20)).await.unwrap();
        assert_eq!(status, None);
    }
}
