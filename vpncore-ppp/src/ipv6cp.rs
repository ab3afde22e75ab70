use std::net::Ipv4Addr;

use crate::negotiator::{Negotiator, ReplyCode};

pub const OPT_INTERFACE_IDENTIFIER: u8 = 1;

/// Derives a 64-bit interface identifier from an assigned IPv4 address, the
/// same way a modem-link client fabricates one when it has no MAC address
/// to draw an EUI-64 from: zero-extend the address into the low 32 bits and
/// set a fixed, locally-administered prefix in the high 32 bits.
fn derive_interface_id(addr: Ipv4Addr) -> [u8; 8] {
    let octets = addr.octets();
    [0x02, 0x00, 0x00, 0x00, octets[0], octets[1], octets[2], octets[3]]
}

/// IPV6CP: IPv6 network-layer negotiation (RFC 5072). We propose an
/// interface identifier derived from our assigned IPv4 address and accept
/// whatever identifier the peer proposes for its own side.
pub struct Ipv6cpNegotiator {
    pub local_id: [u8; 8],
    pub peer_id: Option<[u8; 8]>,
}

impl Ipv6cpNegotiator {
    pub fn new(assigned_v4: Ipv4Addr) -> Self {
        Self { local_id: derive_interface_id(assigned_v4), peer_id: None }
    }

    pub fn with_identifier(local_id: [u8; 8]) -> Self {
        Self { local_id, peer_id: None }
    }
}

impl Negotiator for Ipv6cpNegotiator {
    fn protocol(&self) -> u16 {
        vpncore_framing::PROTO_IPV6CP
    }

    fn name(&self) -> &'static str {
        "IPV6CP"
    }

    fn build_request(&mut self) -> Vec<(u8, Vec<u8>)> {
        vec![(OPT_INTERFACE_IDENTIFIER, self.local_id.to_vec())]
    }

    fn review_request(&mut self, peer_options: &[(u8, Vec<u8>)]) -> (ReplyCode, Vec<(u8, Vec<u8>)>) {
        let mut rejects = Vec::new();
        for (ty, data) in peer_options {
            match *ty {
                OPT_INTERFACE_IDENTIFIER if data.len() == 8 => {
                    let mut id = [0u8; 8];
                    id.copy_from_slice(data);
                    self.peer_id = Some(id);
                }
                _ => rejects.push((*ty, data.clone())),
            }
        }
        if rejects.is_empty() {
            (ReplyCode::Ack, peer_options.to_vec())
        } else {
            (ReplyCode::Reject, rejects)
        }
    }

    fn on_ack(&mut self, _acked_options: &[(u8, Vec<u8>)]) -> bool {
        true
    }

    fn on_nak(&mut self, counter_options: &[(u8, Vec<u8>)]) {
        for (ty, data) in counter_options {
            if *ty == OPT_INTERFACE_IDENTIFIER && data.len() == 8 {
                let mut id = [0u8; 8];
                id.copy_from_slice(data);
                self.local_id = id;
            }
        }
    }

    fn on_reject(&mut self, _rejected_options: &[(u8, Vec<u8>)]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_identifier_from_assigned_address() {
        let ipv6cp = Ipv6cpNegotiator::new(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(ipv6cp.local_id, [0x02, 0x00, 0x00, 0x00, 10, 1, 2, 3]);
    }

    #[test]
    fn accepts_peer_identifier() {
        let mut ipv6cp = Ipv6cpNegotiator::new(Ipv4Addr::new(10, 0, 0, 1));
        let peer = [0x02, 0, 0, 0, 192, 168, 1, 1];
        let (code, _) = ipv6cp.review_request(&[(OPT_INTERFACE_IDENTIFIER, peer.to_vec())]);
        assert_eq!(code, ReplyCode::Ack);
        assert_eq!(ipv6cp.peer_id, Some(peer));
    }

    #[test]
    fn nak_replaces_local_identifier() {
        let mut ipv6cp = Ipv6cpNegotiator::new(Ipv4Addr::new(10, 0, 0, 1));
        let counter = [0x02, 0, 0, 0, 1, 2, 3, 4];
        ipv6cp.on_nak(&[(OPT_INTERFACE_IDENTIFIER, counter.to_vec())]);
        assert_eq!(ipv6cp.local_id, counter);
    }
}
