use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncWrite};

use vpncore_crypto::CryptoPair;
use vpncore_framing::LengthPrefixedFramer;
use vpncore_ppp::{Code, ControlPacket, Phase, PppEngine, PppEvent, PppOutput};
use vpncore_transport::{ActiveTransport, ManagerEvent, TransportManager};

use crate::config::{Dialect, Secret, Settings, TunnelConfig};
use crate::error::TunnelError;
use crate::stats::SessionStats;

/// Everything owned by one tunnel connection: the transport manager, the PPP
/// engine, the installed (or not-yet-installed) datagram crypto, and the
/// connection metadata the authentication collaborator handed us (spec.md
/// §3's `Session` value). One task owns this; nothing here is shared.
pub struct Session<S> {
    manager: TransportManager<S>,
    engine: PppEngine,
    framer: LengthPrefixedFramer,
    crypto: Option<CryptoPair>,
    dialect: Dialect,
    cookie: Secret<Vec<u8>>,
    config: TunnelConfig,
    settings: Settings,
    stats: SessionStats,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Fails fast with `CookieExpired` (§9 Open Question) if `config`'s
    /// `auth_expiration_unix` has already passed: a reconnect never
    /// silently reauthenticates, it surfaces the expiry to the caller
    /// instead of attempting a doomed handshake.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: TransportManager<S>,
        engine: PppEngine,
        framer: LengthPrefixedFramer,
        dialect: Dialect,
        cookie: Secret<Vec<u8>>,
        config: TunnelConfig,
        settings: Settings,
    ) -> Result<Self, TunnelError> {
        if let Some(expiration) = config.auth_expiration_unix {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
            if now >= expiration {
                return Err(TunnelError::CookieExpired);
            }
        }
        Ok(Self { manager, engine, framer, crypto: None, dialect, cookie, config, settings, stats: SessionStats::default() })
    }

    pub fn phase(&self) -> Phase {
        self.engine.phase()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn cookie_bytes(&self) -> &[u8] {
        &self.cookie
    }

    pub fn engine(&self) -> &PppEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PppEngine {
        &mut self.engine
    }

    pub fn manager_mut(&mut self) -> &mut TransportManager<S> {
        &mut self.manager
    }

    /// The address IPCP ultimately settled on for our side — may differ from
    /// `config.addr_v4` if the peer NAKed our initial proposal.
    pub fn negotiated_v4(&self) -> std::net::Ipv4Addr {
        self.engine.ipcp().negotiator.local_addr
    }

    /// Builds the datagram-layer crypto contexts from `TunnelConfig` once the
    /// datagram transport has been promoted. A no-op for dialects that don't
    /// encrypt the datagram path (§3's dialect-tag-gated field).
    pub fn install_datagram_crypto(&mut self) -> Result<(), TunnelError> {
        if !self.dialect.uses_datagram_crypto() {
            return Ok(());
        }
        let Some(params) = &self.config.datagram_crypto else {
            return Err(TunnelError::UnsupportedSuite);
        };
        self.crypto = Some(CryptoPair::new(
            params.enc_alg,
            params.mac_alg,
            params.outbound_spi,
            &params.outbound_enc_key,
            &params.outbound_mac_key,
            params.outbound_initial_iv,
            params.inbound_spi,
            &params.inbound_enc_key,
            &params.inbound_mac_key,
        )?);
        Ok(())
    }

    /// Torn down on demotion (spec §4.5): a later retry needs fresh keying
    /// material, so there is nothing worth keeping.
    pub fn drop_datagram_crypto(&mut self) {
        self.crypto = None;
    }

    /// Frames `(protocol, payload)` for the wire, layering the datagram
    /// IPsec-like encapsulation on top of the framed bytes when the active
    /// transport is datagram and this dialect encrypts it. Control traffic
    /// (LCP echoes, etc.) rides the same envelope as data — the manager
    /// doesn't distinguish the two, so neither do we.
    fn encode_frame(&mut self, protocol: u16, payload: &[u8]) -> Vec<u8> {
        let framed = self.framer.encode(protocol, payload);
        match (self.manager.active(), self.crypto.as_mut()) {
            (ActiveTransport::Datagram, Some(crypto)) => {
                let next_header = if protocol == vpncore_framing::PROTO_IPV6 { vpncore_crypto::NEXT_HEADER_IPV6 } else { vpncore_crypto::NEXT_HEADER_IPV4 };
                crypto.outbound.encrypt(&framed, next_header).unwrap_or(framed)
            }
            _ => framed,
        }
    }

    fn decode_frame(&mut self, bytes: &[u8]) -> Result<(u16, Vec<u8>), TunnelError> {
        let framed = match (self.manager.active(), self.crypto.as_mut()) {
            (ActiveTransport::Datagram, Some(crypto)) => match crypto.inbound.decrypt(bytes) {
                Ok((_, plaintext)) => plaintext,
                Err(vpncore_crypto::CryptoError::BadHmac) => {
                    self.stats.bad_hmac_rejects += 1;
                    return Err(TunnelError::BadHmac);
                }
                Err(vpncore_crypto::CryptoError::Replay) => {
                    self.stats.replay_rejects += 1;
                    return Err(TunnelError::Replay);
                }
                Err(e) => {
                    self.stats.malformed_frame_drops += 1;
                    return Err(e.into());
                }
            },
            _ => bytes.to_vec(),
        };
        self.framer.decode(&framed).map_err(|e| {
            self.stats.malformed_frame_drops += 1;
            e.into()
        })
    }

    /// Decodes one already-received wire frame without going through the
    /// transport manager. Used for the datagram handshake's loss-tolerant
    /// fallback, where the first PPP frame arrives folded into the
    /// handshake response itself (§4.4).
    pub fn decode_wire_frame(&mut self, bytes: &[u8]) -> Result<(u16, Vec<u8>), TunnelError> {
        self.decode_frame(bytes)
    }

    pub async fn send_ppp(&mut self, protocol: u16, payload: Vec<u8>) -> Result<(), TunnelError> {
        let on_datagram = self.manager.active() == ActiveTransport::Datagram;
        let frame = self.encode_frame(protocol, &payload);
        let len = frame.len();
        self.manager.send(&frame).await?;
        self.stats.record_sent(on_datagram, len);
        Ok(())
    }

    /// Waits for the next deliverable frame, silently dropping and counting
    /// per-packet crypto/framing failures (spec §7: these never propagate)
    /// and quietly dropping datagram crypto on demotion before looping back.
    pub async fn recv_frame(&mut self) -> Result<(u16, Vec<u8>, bool), TunnelError> {
        loop {
            match self.manager.recv().await {
                ManagerEvent::Frame(active, bytes) => {
                    let on_datagram = active == ActiveTransport::Datagram;
                    let len = bytes.len();
                    match self.decode_frame(&bytes) {
                        Ok((protocol, payload)) => {
                            self.stats.record_received(on_datagram, len);
                            return Ok((protocol, payload, on_datagram));
                        }
                        Err(TunnelError::BadHmac | TunnelError::Replay | TunnelError::MalformedFrame) => continue,
                        Err(e) => return Err(e),
                    }
                }
                ManagerEvent::StreamLost => return Err(TunnelError::TransportFailed),
                ManagerEvent::DatagramDemoted => self.drop_datagram_crypto(),
                ManagerEvent::DatagramPromoted => {}
            }
        }
    }

    /// §5: transitions to `Closing`, sends LCP Terminate-Request, waits up
    /// to `terminate_timeout_secs` for the ack, then tears down both
    /// transports regardless of whether it arrived.
    pub async fn close(&mut self) -> Result<(), TunnelError> {
        let now = Instant::now();
        let outs = self.engine.close(now);
        for out in outs {
            if let PppOutput::Send(protocol, bytes) = out {
                let _ = self.send_ppp(protocol, bytes).await;
            }
        }
        let deadline = Duration::from_secs(self.settings.terminate_timeout_secs);
        let _ = tokio::time::timeout(deadline, self.wait_for_terminate_ack()).await;
        self.manager.close().await;
        Ok(())
    }

    async fn wait_for_terminate_ack(&mut self) {
        loop {
            match self.recv_frame().await {
                Ok((protocol, payload, _)) if protocol == vpncore_framing::PROTO_LCP => {
                    if let Some(pkt) = ControlPacket::decode(&payload) {
                        if pkt.code == Code::TerminateAck {
                            return;
                        }
                    }
                }
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    }

    /// Feeds a single inbound `(protocol, payload)` pair through the PPP
    /// engine. Split out of `recv_frame` so the driver can step the engine
    /// with its own clock reading.
    pub fn step(&mut self, event: PppEvent, now: Instant) -> Vec<PppOutput> {
        self.engine.step(event, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpncore_ppp::PppEngine;
    use vpncore_transport::StreamTransport;
    use std::net::Ipv4Addr;

    fn framer() -> LengthPrefixedFramer {
        LengthPrefixedFramer::new(vec![0x50, 0x50], 1500)
    }

    fn new_engine() -> PppEngine {
        PppEngine::new(1400, Ipv4Addr::new(10, 0, 0, 2), Some(Ipv4Addr::new(8, 8, 8, 8)), false, 10, Duration::from_secs(3), Duration::from_secs(2), Duration::from_secs(30), 3)
    }

    fn test_config() -> TunnelConfig {
        TunnelConfig {
            addr_v4: Some(Ipv4Addr::new(10, 0, 0, 2)),
            netmask_v4: Some(Ipv4Addr::new(255, 255, 255, 0)),
            addr_v6: None,
            prefix_len_v6: None,
            dns_servers: vec![],
            search_domains: vec![],
            split_includes: vec![],
            idle_timeout_secs: 1800,
            auth_expiration_unix: None,
            mtu: 1400,
            dpd_interval_secs: 30,
            datagram_crypto: None,
        }
    }

    fn new_session() -> Session<tokio::io::DuplexStream> {
        let (client, _server) = tokio::io::duplex(64);
        let transport = StreamTransport::new(client, framer());
        let manager = TransportManager::new(transport);
        Session::new(manager, new_engine(), framer(), Dialect::DialectA, Secret(b"cookie".to_vec()), test_config(), Settings::default()).unwrap()
    }

    #[tokio::test]
    async fn encode_then_decode_round_trips_without_crypto() {
        let mut session = new_session();
        let frame = session.encode_frame(vpncore_framing::PROTO_IP, b"ip packet bytes");
        let (protocol, payload) = session.decode_frame(&frame).unwrap();
        assert_eq!(protocol, vpncore_framing::PROTO_IP);
        assert_eq!(payload, b"ip packet bytes");
    }

    #[tokio::test]
    async fn non_crypto_dialect_skips_crypto_installation() {
        let mut session = new_session();
        assert!(session.install_datagram_crypto().is_ok());
        assert!(session.crypto.is_none());
    }

    #[tokio::test]
    async fn negotiated_v4_matches_config_before_any_nak() {
        let session = new_session();
        assert_eq!(session.negotiated_v4(), Ipv4Addr::new(10, 0, 0, 2));
    }

    #[tokio::test]
    async fn new_rejects_an_already_expired_cookie() {
        let (client, _server) = tokio::io::duplex(64);
        let transport = StreamTransport::new(client, framer());
        let manager = TransportManager::new(transport);
        let mut config = test_config();
        config.auth_expiration_unix = Some(1);
        let err = Session::new(manager, new_engine(), framer(), Dialect::DialectA, Secret(b"cookie".to_vec()), config, Settings::default()).unwrap_err();
        assert!(matches!(err, TunnelError::CookieExpired));
    }

    #[tokio::test]
    async fn new_accepts_a_not_yet_expired_cookie() {
        let (client, _server) = tokio::io::duplex(64);
        let transport = StreamTransport::new(client, framer());
        let manager = TransportManager::new(transport);
        let mut config = test_config();
        let far_future = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + 3600;
        config.auth_expiration_unix = Some(far_future);
        assert!(Session::new(manager, new_engine(), framer(), Dialect::DialectA, Secret(b"cookie".to_vec()), config, Settings::default()).is_ok());
    }
}
