use vpncore_crypto::CryptoError;
use vpncore_framing::FramingError;
use vpncore_ppp::PppError;
use vpncore_transport::TransportError;

/// Unified session-boundary error (spec.md §7). Per-packet crypto/framing
/// failures never reach here directly — the receive path drops them and
/// bumps a counter in `SessionStats` — except where a variant's own doc
/// says otherwise.
#[derive(Debug)]
pub enum TunnelError {
    /// The stream transport died; fatal, the core does not reauthenticate.
    TransportFailed,
    /// The datagram transport died or failed its handshake; the manager
    /// demotes to stream and keeps the session alive. Surfaced here only
    /// for observability, not as a fatal condition.
    DatagramFailed,
    BadHmac,
    Replay,
    MalformedFrame,
    SeqWrapped,
    UnsupportedSuite,
    /// LCP or a network-layer control protocol exceeded `max_configure`.
    PppTimeout,
    /// The routing/DNS helper exited non-zero.
    HelperFailed(i32),
    /// `Session::close` was called.
    Cancelled,
    /// A reconnect was attempted with a cookie past its
    /// `auth_expiration_unix`; no silent reauthentication (§9 Open
    /// Question).
    CookieExpired,
    /// The outbound queue is still full of frames waiting for writable
    /// readiness; non-fatal, the caller should back off and retry the send
    /// rather than tear the session down.
    Busy,
    /// The gateway answered the stream tunnel-start request with an HTTP
    /// response instead of framed PPP traffic; carries the status line.
    TunnelRejected(String),
}

impl std::fmt::Display for TunnelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportFailed => f.write_str("TransportFailed"),
            Self::DatagramFailed => f.write_str("DatagramFailed"),
            Self::BadHmac => f.write_str("BadHMAC"),
            Self::Replay => f.write_str("Replay"),
            Self::MalformedFrame => f.write_str("MalformedFrame"),
            Self::SeqWrapped => f.write_str("SeqWrapped"),
            Self::UnsupportedSuite => f.write_str("UnsupportedSuite"),
            Self::PppTimeout => f.write_str("PPPTimeout"),
            Self::HelperFailed(code) => write!(f, "HelperFailed({code})"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::CookieExpired => f.write_str("CookieExpired"),
            Self::Busy => f.write_str("Busy"),
            Self::TunnelRejected(status) => write!(f, "TunnelRejected({status})"),
        }
    }
}

impl std::error::Error for TunnelError {}

impl From<TransportError> for TunnelError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed | TransportError::Io(_) => Self::TransportFailed,
            // The manager's own `flush_outbound` already retries a transient
            // `WouldBlock` against writable readiness; this only surfaces
            // here when the outbound queue itself is still full of earlier
            // frames, which is load, not failure.
            TransportError::WouldBlock => Self::Busy,
            TransportError::MalformedHandshake | TransportError::HandshakeTimeout => Self::DatagramFailed,
            TransportError::Oversized => Self::MalformedFrame,
            TransportError::StreamRejected(status) => Self::TunnelRejected(status),
        }
    }
}

impl From<PppError> for TunnelError {
    fn from(e: PppError) -> Self {
        match e {
            PppError::Timeout => Self::PppTimeout,
            PppError::AuthenticationRefused => Self::PppTimeout,
        }
    }
}

impl From<CryptoError> for TunnelError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::BadHmac => Self::BadHmac,
            CryptoError::Replay => Self::Replay,
            CryptoError::Malformed => Self::MalformedFrame,
            CryptoError::SeqWrapped => Self::SeqWrapped,
            CryptoError::UnsupportedSuite => Self::UnsupportedSuite,
        }
    }
}

impl From<FramingError> for TunnelError {
    fn from(_: FramingError) -> Self {
        Self::MalformedFrame
    }
}
