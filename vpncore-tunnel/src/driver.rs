use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UdpSocket;
use tracing::{info, warn};

use vpncore_packet::{Origin, Packet};
use vpncore_ppp::{Phase, PppEvent, PppOutput};

use crate::config::SplitInclude;
use crate::error::TunnelError;
use crate::session::Session;

/// The local virtual network interface, abstracted so the driver's packet
/// relay and helper-invocation logic can be exercised without a real TUN
/// device. Mirrors `vpncore_transport::Transport`'s send/recv shape.
#[async_trait::async_trait]
pub trait TunDevice: Send {
    async fn recv(&mut self) -> std::io::Result<Vec<u8>>;
    async fn send(&mut self, packet: &[u8]) -> std::io::Result<()>;
}

/// Couples the PPP engine's phase transitions to the local interface: on
/// reaching `Open`, assigns addresses and invokes the routing/DNS helper
/// with `connect`; on leaving `Open`, invokes it with `disconnect`. Relays
/// packets between the interface and the active transport while open
/// (spec §4.6).
pub struct TunnelDriver<S, T> {
    session: Session<S>,
    tun: T,
    helper_path: PathBuf,
    gateway: String,
    tundev_name: String,
    was_open: bool,
}

impl<S, T> TunnelDriver<S, T>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    T: TunDevice,
{
    pub fn new(session: Session<S>, tun: T, helper_path: impl Into<PathBuf>, gateway: impl Into<String>, tundev_name: impl Into<String>) -> Self {
        Self { session, tun, helper_path: helper_path.into(), gateway: gateway.into(), tundev_name: tundev_name.into(), was_open: false }
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    /// Kicks off LCP negotiation. Call once the stream transport is
    /// connected (`TransportManager::connect` already ran).
    pub async fn start(&mut self) -> Result<(), TunnelError> {
        let outs = self.session.step(PppEvent::Up, Instant::now());
        self.dispatch(outs).await
    }

    /// Runs the datagram handshake on an already-bound socket and, on
    /// success, installs the datagram-layer crypto contexts.
    pub async fn try_promote_datagram(&mut self, socket: UdpSocket, timeout: Duration) -> Result<(), TunnelError> {
        let cookie = self.session.cookie_bytes().to_vec();
        let lost_ok_frame = self.session.manager_mut().probe_datagram(socket, &cookie, timeout).await;
        if self.session.manager_mut().active() == vpncore_transport::ActiveTransport::Datagram {
            self.session.install_datagram_crypto()?;
            if let Some(frame) = lost_ok_frame {
                self.on_wire_bytes(frame).await?;
            }
        }
        Ok(())
    }

    /// The main event loop: relays frames between the transport manager and
    /// the local interface, drives the PPP engine's clock, and invokes the
    /// helper on phase transitions. Returns once PPP reaches `Terminate`.
    pub async fn run(&mut self) -> Result<(), TunnelError> {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                frame = self.session.recv_frame() => {
                    let (protocol, payload, _) = frame?;
                    let outs = self.session.step(PppEvent::Frame { protocol, payload }, Instant::now());
                    self.dispatch(outs).await?;
                }
                pkt = self.tun.recv() => {
                    let pkt = pkt.map_err(|_| TunnelError::TransportFailed)?;
                    self.send_data_packet(pkt).await?;
                }
                _ = ticker.tick() => {
                    let outs = self.session.step(PppEvent::Tick(Instant::now()), Instant::now());
                    self.dispatch(outs).await?;
                }
            }
            if self.session.phase() == Phase::Terminate {
                return Ok(());
            }
        }
    }

    async fn on_wire_bytes(&mut self, bytes: Vec<u8>) -> Result<(), TunnelError> {
        // The lost-`ok` PPP frame the datagram handshake may hand back
        // (§4.4) still needs framer/crypto decoding, exactly like any frame
        // `recv_frame` would have delivered.
        let (protocol, payload) = self.session.decode_wire_frame(&bytes)?;
        let outs = self.session.step(PppEvent::Frame { protocol, payload }, Instant::now());
        self.dispatch(outs).await
    }

    async fn send_data_packet(&mut self, raw: Vec<u8>) -> Result<(), TunnelError> {
        let protocol = if raw.first().map(|b| b >> 4) == Some(6) { vpncore_framing::PROTO_IPV6 } else { vpncore_framing::PROTO_IP };
        let packet = Packet::from_payload(Origin::Interface, &raw).ok_or(TunnelError::MalformedFrame)?;
        self.session.send_ppp(protocol, packet.payload().to_vec()).await
    }

    async fn dispatch(&mut self, outs: Vec<PppOutput>) -> Result<(), TunnelError> {
        for out in outs {
            match out {
                PppOutput::Send(protocol, bytes) => self.session.send_ppp(protocol, bytes).await?,
                PppOutput::Deliver(_, payload) => {
                    if let Err(e) = self.tun.send(&payload).await {
                        warn!(error = %e, "dropping inbound packet the interface refused");
                    }
                }
                PppOutput::PhaseChanged(phase) => self.on_phase_changed(phase).await?,
                PppOutput::Failed(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn on_phase_changed(&mut self, phase: Phase) -> Result<(), TunnelError> {
        match phase {
            Phase::Open if !self.was_open => {
                self.was_open = true;
                let env = connect_env(self.session.config(), &self.gateway, &self.tundev_name, self.session.negotiated_v4());
                info!(gateway = %self.gateway, tundev = %self.tundev_name, "PPP open; invoking connect helper");
                invoke_helper(&self.helper_path, env).await?;
            }
            Phase::Terminate if self.was_open => {
                self.was_open = false;
                let env = disconnect_env(&self.gateway, &self.tundev_name);
                info!(gateway = %self.gateway, tundev = %self.tundev_name, "PPP terminated; invoking disconnect helper");
                invoke_helper(&self.helper_path, env).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn connect_env(config: &crate::config::TunnelConfig, gateway: &str, tundev: &str, assigned_v4: Ipv4Addr) -> Vec<(String, String)> {
    let mut env = vec![("reason".to_string(), "connect".to_string()), ("VPNGATEWAY".to_string(), gateway.to_string()), ("TUNDEV".to_string(), tundev.to_string())];
    env.push(("INTERNAL_IP4_ADDRESS".to_string(), assigned_v4.to_string()));

    let v4_includes: Vec<&SplitInclude> = config.split_includes.iter().filter(|s| !s.is_v6).collect();
    // §8 S6: no split-includes means default route, signaled by a
    // 0.0.0.0 netmask rather than the assigned one.
    let netmask = if v4_includes.is_empty() { Ipv4Addr::UNSPECIFIED } else { config.netmask_v4.unwrap_or(Ipv4Addr::new(255, 255, 255, 255)) };
    env.push(("INTERNAL_IP4_NETMASK".to_string(), netmask.to_string()));

    if !config.dns_servers.is_empty() {
        let joined = config.dns_servers.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        env.push(("INTERNAL_IP4_DNS".to_string(), joined));
    }

    if let Some(addr6) = config.addr_v6 {
        env.push(("INTERNAL_IP6_ADDRESS".to_string(), addr6.to_string()));
        if let Some(plen) = config.prefix_len_v6 {
            env.push(("INTERNAL_IP6_NETMASK".to_string(), plen.to_string()));
        }
    }

    if !config.search_domains.is_empty() {
        env.push(("CISCO_DEF_DOMAIN".to_string(), config.search_domains.join(" ")));
    }

    if !v4_includes.is_empty() {
        env.push(("CISCO_SPLIT_INC".to_string(), v4_includes.len().to_string()));
        for (i, inc) in v4_includes.iter().enumerate() {
            env.push((format!("CISCO_SPLIT_INC_{i}_ADDR"), inc.prefix.clone()));
            env.push((format!("CISCO_SPLIT_INC_{i}_MASK"), inc.mask_or_len.clone()));
        }
    }

    let v6_includes: Vec<&SplitInclude> = config.split_includes.iter().filter(|s| s.is_v6).collect();
    if !v6_includes.is_empty() {
        env.push(("CISCO_IPV6_SPLIT_INC".to_string(), v6_includes.len().to_string()));
        for (i, inc) in v6_includes.iter().enumerate() {
            env.push((format!("CISCO_IPV6_SPLIT_INC_{i}_ADDR"), inc.prefix.clone()));
            env.push((format!("CISCO_IPV6_SPLIT_INC_{i}_MASKLEN"), inc.mask_or_len.clone()));
        }
    }

    env.push(("IDLE_TIMEOUT".to_string(), config.idle_timeout_secs.to_string()));
    env
}

fn disconnect_env(gateway: &str, tundev: &str) -> Vec<(String, String)> {
    vec![("reason".to_string(), "disconnect".to_string()), ("VPNGATEWAY".to_string(), gateway.to_string()), ("TUNDEV".to_string(), tundev.to_string())]
}

/// Spawns the helper as a blocking child-process wait on a dedicated thread
/// (§5: "a second thread... to host blocking calls that have no non-blocking
/// counterpart"), reporting the exit status back to the event loop over a
/// channel rather than a shared readiness flag, since a one-shot result is
/// simpler than a coalesced signal here.
async fn invoke_helper(helper_path: &Path, env: Vec<(String, String)>) -> Result<(), TunnelError> {
    let mut cmd = std::process::Command::new(helper_path);
    for (key, value) in &env {
        cmd.env(key, value);
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    tokio::task::spawn_blocking(move || {
        let result = cmd.status();
        let _ = tx.blocking_send(result);
    });

    let status = rx.recv().await.ok_or(TunnelError::HelperFailed(-1))?.map_err(|_| TunnelError::HelperFailed(-1))?;
    if status.success() {
        Ok(())
    } else {
        Err(TunnelError::HelperFailed(status.code().unwrap_or(-1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunnelConfig;

    fn base_config() -> TunnelConfig {
        TunnelConfig {
            addr_v4: Some(Ipv4Addr::new(10, 0, 0, 5)),
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

    #[test]
    fn default_route_sets_zero_netmask_and_no_split_inc() {
        let config = base_config();
        let env = connect_env(&config, "gw.example", "utun0", Ipv4Addr::new(10, 0, 0, 5));
        let lookup = |k: &str| env.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(lookup("INTERNAL_IP4_NETMASK"), Some("0.0.0.0".to_string()));
        assert_eq!(lookup("CISCO_SPLIT_INC"), None);
        assert_eq!(lookup("reason"), Some("connect".to_string()));
    }

    #[test]
    fn split_include_routes_are_enumerated() {
        let mut config = base_config();
        config.split_includes = vec![SplitInclude { prefix: "10.1.0.0".to_string(), mask_or_len: "255.255.0.0".to_string(), is_v6: false }];
        let env = connect_env(&config, "gw.example", "utun0", Ipv4Addr::new(10, 0, 0, 5));
        let lookup = |k: &str| env.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(lookup("CISCO_SPLIT_INC"), Some("1".to_string()));
        assert_eq!(lookup("CISCO_SPLIT_INC_0_ADDR"), Some("10.1.0.0".to_string()));
        assert_eq!(lookup("INTERNAL_IP4_NETMASK"), Some("255.255.255.0".to_string()));
    }

    #[test]
    fn disconnect_env_carries_reason_and_gateway() {
        let env = disconnect_env("gw.example", "utun0");
        assert!(env.contains(&("reason".to_string(), "disconnect".to_string())));
        assert!(env.contains(&("VPNGATEWAY".to_string(), "gw.example".to_string())));
    }
}
