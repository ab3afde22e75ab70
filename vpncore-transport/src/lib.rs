//! The two pluggable transports (stream and datagram) and the manager that
//! owns their lifecycle, promotion, and demotion (spec §4.4/§4.5).
//!
//! Grounded on the teacher's `vl1-service::sys::udp::BoundUdpPort` for
//! wrapping a concrete `tokio::net::UdpSocket` directly rather than behind
//! a generic socket trait, and on `vl1service.rs`'s `Arc<Self>`-owned daemon
//! loops for the manager's single-owner, no-internal-locking shape — here
//! expressed as one `tokio::select!`-driven loop instead of spawned
//! daemons, since the spec calls for a single-threaded cooperative model.

mod datagram;
mod error;
mod manager;
mod stream;

pub use datagram::{build_clthello, parse_svrhello, DatagramTransport, HandshakeReply};
pub use error::TransportError;
pub use manager::{ActiveTransport, ManagerEvent, ManagerState, TransportManager};
pub use stream::StreamTransport;

/// Shared contract between the stream and datagram transports: buffer a
/// frame for sending (the underlying socket decides whether that means an
/// immediate write or a short internal queue), and receive one complete
/// frame at a time. `send` only ever reports `WouldBlock` where the
/// underlying non-blocking primitive can genuinely signal backpressure
/// (the datagram socket); the stream side's `write_all` already yields to
/// the scheduler instead of actually blocking a thread, which is this
/// crate's idiomatic-Rust expression of "send returns immediately".
#[async_trait::async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
    async fn close(&mut self);

    /// Resolves once the transport is likely able to accept another `send`
    /// without `WouldBlock`. The default is a no-op: `write_all` on the
    /// stream side already yields instead of genuinely blocking, so it has
    /// no readiness of its own to subscribe to. The datagram transport
    /// overrides this to wait on the underlying socket.
    async fn writable(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
