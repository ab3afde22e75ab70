use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::TransportError;
use crate::Transport;

/// Fixed tag prefixed to both `clthello` and `svrhello` envelopes, matching
/// the dialect whose concrete wire layout spec names (`"GFtype"` followed
/// by a NUL).
const HELLO_TAG: &[u8] = b"GFtype\0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    Ok,
    Fail,
    /// The server started sending PPP traffic directly; its `ok` reply was
    /// presumably lost. Spec treats this as handshake success and the
    /// caller should redeliver `0` as the first received frame.
    PppFrame(Vec<u8>),
}

/// Builds the `clthello` datagram for `cookie`. The `len` field is, per the
/// observed wire format, the length of `"clthello\0SVPNCOOKIE\0" ‖ cookie`
/// *not* counting the trailing NUL that terminates the cookie string —
/// a quirk of the originating C implementation's `strlen`-before-`snprintf`
/// construction, reproduced here byte-for-byte rather than "fixed".
pub fn build_clthello(cookie: &[u8]) -> Vec<u8> {
    let mut counted = Vec::with_capacity(9 + 11 + cookie.len());
    counted.extend_from_slice(b"clthello\0");
    counted.extend_from_slice(b"SVPNCOOKIE\0");
    counted.extend_from_slice(cookie);

    let mut out = Vec::with_capacity(2 + HELLO_TAG.len() + counted.len() + 1);
    out.extend_from_slice(&(counted.len() as u16).to_be_bytes());
    out.extend_from_slice(HELLO_TAG);
    out.extend_from_slice(&counted);
    out.push(0);
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses a `svrhello` reply, or recognizes the loss-tolerant fallback
/// where the server skipped straight to PPP traffic.
pub fn parse_svrhello(bytes: &[u8]) -> HandshakeReply {
    const SVRHELLO: &[u8] = b"svrhello\0";
    if let Some(pos) = find_subslice(bytes, SVRHELLO) {
        let status = &bytes[pos + SVRHELLO.len()..];
        if status.starts_with(b"ok") {
            return HandshakeReply::Ok;
        }
        if status.starts_with(b"fail") {
            return HandshakeReply::Fail;
        }
    }
    HandshakeReply::PppFrame(bytes.to_vec())
}

/// Wraps a DTLS-protected datagram socket (the DTLS handshake itself is a
/// collaborator concern completed before this type is constructed, same as
/// the stream transport's TLS layer). Message boundaries are preserved by
/// the underlying datagram socket, so unlike the stream transport this
/// needs no reassembly.
pub struct DatagramTransport {
    socket: UdpSocket,
    closed: bool,
}

impl DatagramTransport {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket, closed: false }
    }

    /// Performs the protocol-level handshake described in §4.4/§6: send
    /// `clthello`, wait up to `timeout` for a reply. Any failure disables
    /// the datagram transport for the remainder of the session; the caller
    /// is expected to drop this value on `Err`.
    pub async fn handshake(&mut self, cookie: &[u8], timeout: Duration) -> Result<HandshakeReply, TransportError> {
        let hello = build_clthello(cookie);
        self.socket.send(&hello).await?;

        let mut buf = [0u8; 2048];
        let n = tokio::time::timeout(timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::HandshakeTimeout)??;
        if n == 0 {
            return Err(TransportError::MalformedHandshake);
        }
        match parse_svrhello(&buf[..n]) {
            HandshakeReply::Fail => Err(TransportError::MalformedHandshake),
            other => Ok(other),
        }
    }
}

#[async_trait::async_trait]
impl Transport for DatagramTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.socket.try_send(frame) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(TransportError::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }

    async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut buf = [0u8; 2048];
        let n = self.socket.recv(&mut buf).await?;
        Ok(buf[..n].to_vec())
    }

    async fn close(&mut self) {
        self.closed = true;
    }

    async fn writable(&mut self) -> Result<(), TransportError> {
        self.socket.writable().await?;
        Ok(())
    }
}

impl DatagramTransport {
    /// Non-blocking single-datagram read used by the manager's per-source
    /// burst drain. Returns `None` on `WouldBlock` (nothing more buffered)
    /// as well as on any other I/O error, since a burst-drain failure isn't
    /// worth tearing the session down over — the next `recv` will surface
    /// a real transport loss through its own, blocking read.
    pub(crate) fn try_recv_burst(&mut self) -> Option<Vec<u8>> {
        if self.closed {
            return None;
        }
        let mut buf = [0u8; 2048];
        self.socket.try_recv(&mut buf).ok().map(|n| buf[..n].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clthello_matches_the_documented_wire_literal() {
        let expected: Vec<u8> = vec![
            0x00, 0x17, 0x47, 0x46, 0x74, 0x79, 0x70, 0x65, 0x00, 0x63, 0x6c, 0x74, 0x68, 0x65, 0x6c, 0x6c, 0x6f, 0x00, 0x53, 0x56, 0x50, 0x4e, 0x43, 0x4f, 0x4f, 0x4b, 0x49, 0x45, 0x00, 0x61, 0x62,
            0x63, 0x00,
        ];
        assert_eq!(build_clthello(b"abc"), expected);
    }

    #[test]
    fn parses_ok_and_fail_status() {
        let ok = build_hello_reply(b"ok");
        let fail = build_hello_reply(b"fail");
        assert_eq!(parse_svrhello(&ok), HandshakeReply::Ok);
        assert_eq!(parse_svrhello(&fail), HandshakeReply::Fail);
    }

    #[test]
    fn non_hello_bytes_treated_as_ppp_frame() {
        let frame = vec![0x00, 0x06, 0x50, 0x50, 0xC0, 0x21, 0x01, 0x02];
        assert_eq!(parse_svrhello(&frame), HandshakeReply::PppFrame(frame));
    }

    fn build_hello_reply(status: &[u8]) -> Vec<u8> {
        let mut counted = Vec::new();
        counted.extend_from_slice(b"svrhello\0");
        counted.extend_from_slice(status);
        let mut out = Vec::new();
        out.extend_from_slice(&(counted.len() as u16).to_be_bytes());
        out.extend_from_slice(HELLO_TAG);
        out.extend_from_slice(&counted);
        out
    }
}
