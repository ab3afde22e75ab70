#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PppError {
    /// LCP or a network-layer control protocol exceeded `max_configure`
    /// retries without reaching `Opened`.
    Timeout,
    /// The peer proposed an authentication protocol; we pre-authenticated
    /// over HTTPS and refuse any auth phase.
    AuthenticationRefused,
}

impl std::fmt::Display for PppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => f.write_str("PPPTimeout"),
            Self::AuthenticationRefused => f.write_str("AuthenticationRefused"),
        }
    }
}

impl std::error::Error for PppError {}
