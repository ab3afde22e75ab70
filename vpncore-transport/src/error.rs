#[derive(Debug)]
pub enum TransportError {
    /// The underlying transport is gone; fatal for the stream transport,
    /// recoverable (demote) for the datagram transport.
    Closed,
    /// Non-blocking send couldn't make progress; the frame must be
    /// retried once the transport reports writable again.
    WouldBlock,
    /// Underlying I/O failure, message retained for diagnostics only.
    Io(String),
    /// A `svrhello` or stream tunnel-request reply didn't parse.
    MalformedHandshake,
    /// No handshake reply (or a PPP-looking frame) arrived within the
    /// configured timeout.
    HandshakeTimeout,
    /// Frame too large to fit the packet buffer's head/tail room.
    Oversized,
    /// The gateway replied to the stream tunnel-start request with an HTTP
    /// response instead of proceeding straight to PPP traffic — carries the
    /// response's status line.
    StreamRejected(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => f.write_str("TransportClosed"),
            Self::WouldBlock => f.write_str("WouldBlock"),
            Self::Io(msg) => write!(f, "Io({msg})"),
            Self::MalformedHandshake => f.write_str("MalformedHandshake"),
            Self::HandshakeTimeout => f.write_str("HandshakeTimeout"),
            Self::Oversized => f.write_str("Oversized"),
            Self::StreamRejected(status) => write!(f, "StreamRejected({status})"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
