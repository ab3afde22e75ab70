use tracing::debug;

use vpncore_tunnel::TunDevice;

/// Stand-in for a platform TUN device: never originates a packet of its
/// own and just logs what the driver hands it to deliver. Lets the demo
/// exercise PPP negotiation and packet relay without a real interface.
#[derive(Default)]
pub struct NullTun;

#[async_trait::async_trait]
impl TunDevice for NullTun {
    async fn recv(&mut self) -> std::io::Result<Vec<u8>> {
        std::future::pending().await
    }

    async fn send(&mut self, packet: &[u8]) -> std::io::Result<()> {
        debug!(bytes = packet.len(), "would deliver packet to interface");
        Ok(())
    }
}
