/// Errors from the packet crypto layer. Hand-rolled `Display`/`Error`
/// rather than a derive-macro crate, matching the teacher's own
/// `zssp::Error` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// The enc/mac algorithm pair requested at initialization isn't one of
    /// the supported `{AES-128,AES-256}-CBC x {HMAC-MD5,HMAC-SHA1}` combos,
    /// or a key was the wrong length for its algorithm.
    UnsupportedSuite,
    /// Truncated HMAC tag didn't match.
    BadHmac,
    /// Sequence number was outside the replay window or already seen.
    Replay,
    /// Packet too short to contain a valid header/tag, or ciphertext length
    /// wasn't a multiple of the block size.
    Malformed,
    /// The outbound sequence counter has been exhausted; the session needs
    /// fresh keying material before another packet can be sent.
    SeqWrapped,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedSuite => f.write_str("UnsupportedSuite"),
            Self::BadHmac => f.write_str("BadHmac"),
            Self::Replay => f.write_str("Replay"),
            Self::Malformed => f.write_str("Malformed"),
            Self::SeqWrapped => f.write_str("SeqWrapped"),
        }
    }
}

impl std::error::Error for CryptoError {}
