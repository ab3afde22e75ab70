use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vpncore_crypto::{EncAlg, MacAlg};

/// Redacts its contents in `Debug` so cookies and key material never end up
/// in a log line by accident. `Clone`/`Serialize`/`Deserialize` still see
/// through it — redaction is a debug-formatting concern only.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secret<T>(pub T);

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl<T> std::ops::Deref for Secret<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

/// The negotiated server dialect. Each affects which framing the PPP layer
/// uses and whether the datagram transport's IPsec-like crypto applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    DialectA,
    DialectB,
    DialectC,
    DialectD,
}

impl Dialect {
    /// Whether this dialect's datagram transport carries the IPsec-like
    /// encapsulation from §4.1, versus plain PPP-framed datagrams.
    pub fn uses_datagram_crypto(self) -> bool {
        matches!(self, Dialect::DialectC | Dialect::DialectD)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInclude {
    pub prefix: String,
    pub mask_or_len: String,
    pub is_v6: bool,
}

/// Datagram-layer crypto parameters, present only for dialects using the
/// IPsec-like encapsulation (§3).
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatagramCryptoParams {
    pub enc_alg: EncAlg,
    pub mac_alg: MacAlg,
    pub outbound_spi: u32,
    pub inbound_spi: u32,
    /// 32 or 48 bytes total, split encryption key + HMAC key per
    /// direction, as delivered by the authentication collaborator.
    pub outbound_enc_key: Secret<Vec<u8>>,
    pub outbound_mac_key: Secret<Vec<u8>>,
    pub inbound_enc_key: Secret<Vec<u8>>,
    pub inbound_mac_key: Secret<Vec<u8>>,
    pub outbound_initial_iv: [u8; 16],
}

impl fmt::Debug for DatagramCryptoParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramCryptoParams")
            .field("enc_alg", &self.enc_alg)
            .field("mac_alg", &self.mac_alg)
            .field("outbound_spi", &self.outbound_spi)
            .field("inbound_spi", &self.inbound_spi)
            .finish_non_exhaustive()
    }
}

/// Delivered by the authentication collaborator once per connect (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelConfig {
    pub addr_v4: Option<Ipv4Addr>,
    pub netmask_v4: Option<Ipv4Addr>,
    pub addr_v6: Option<Ipv6Addr>,
    pub prefix_len_v6: Option<u8>,

    pub dns_servers: Vec<std::net::IpAddr>,
    pub search_domains: Vec<String>,

    /// Empty ⇒ default route through the tunnel (§3).
    pub split_includes: Vec<SplitInclude>,

    pub idle_timeout_secs: u32,
    /// Absolute auth expiration, as Unix seconds (the authentication
    /// collaborator owns wall-clock semantics; we only carry the value).
    pub auth_expiration_unix: Option<u64>,
    pub mtu: u16,
    pub dpd_interval_secs: u32,

    pub datagram_crypto: Option<DatagramCryptoParams>,
}

impl TunnelConfig {
    pub fn dpd_interval(&self) -> Duration {
        Duration::from_secs(self.dpd_interval_secs as u64)
    }

    /// §9 Open Question: split-DNS domains are parsed but never enforced
    /// upstream (observed in `original_source`); we only log, never act.
    pub fn has_split_dns(&self) -> bool {
        !self.search_domains.is_empty()
    }
}

/// Local tunables the host application can override; defaults match the
/// spec's literal values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub max_configure: u32,
    pub restart_timer_secs: u64,
    pub terminate_timeout_secs: u64,
    pub dpd_fail_count: u32,
    pub per_source_budget: usize,
    pub outbound_queue_depth: usize,
    pub inbound_queue_depth: usize,
    pub client_hello_timeout_secs: u64,
}

impl Settings {
    /// Derives the transport manager's queue/fairness tunables from these
    /// settings, so the two crates' knobs stay in lockstep instead of the
    /// manager hardcoding its own defaults.
    pub fn manager_config(&self) -> vpncore_transport::ManagerConfig {
        vpncore_transport::ManagerConfig {
            per_source_budget: self.per_source_budget,
            outbound_queue_depth: self.outbound_queue_depth,
            inbound_queue_depth: self.inbound_queue_depth,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_configure: 10,
            restart_timer_secs: 3,
            terminate_timeout_secs: 2,
            dpd_fail_count: 3,
            per_source_budget: 32,
            outbound_queue_depth: 256,
            inbound_queue_depth: 256,
            client_hello_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_redacts_in_debug() {
        let s = Secret(b"cookie-value".to_vec());
        assert_eq!(format!("{s:?}"), "Secret(..)");
    }

    #[test]
    fn default_settings_match_spec_literals() {
        let s = Settings::default();
        assert_eq!(s.restart_timer_secs, 3);
        assert_eq!(s.terminate_timeout_secs, 2);
    }

    #[test]
    fn tunnel_config_round_trips_through_json() {
        let cfg = TunnelConfig {
            addr_v4: Some(Ipv4Addr::new(10, 0, 0, 5)),
            netmask_v4: Some(Ipv4Addr::new(255, 255, 255, 0)),
            addr_v6: None,
            prefix_len_v6: None,
            dns_servers: vec![std::net::IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))],
            search_domains: vec!["corp.example".to_string()],
            split_includes: vec![],
            idle_timeout_secs: 1800,
            auth_expiration_unix: Some(1_800_000_000),
            mtu: 1400,
            dpd_interval_secs: 30,
            datagram_crypto: None,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TunnelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
        assert!(back.has_split_dns());
    }
}
