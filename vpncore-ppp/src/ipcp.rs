use std::net::Ipv4Addr;

use crate::negotiator::{Negotiator, ReplyCode};

pub const OPT_IP_COMPRESSION: u8 = 2;
pub const OPT_IP_ADDRESS: u8 = 3;
pub const OPT_PRIMARY_DNS: u8 = 129;
pub const OPT_PRIMARY_NBNS: u8 = 130;
pub const OPT_SECONDARY_DNS: u8 = 131;
pub const OPT_SECONDARY_NBNS: u8 = 132;

fn encode_addr(addr: Ipv4Addr) -> Vec<u8> {
    addr.octets().to_vec()
}

fn decode_addr(data: &[u8]) -> Option<Ipv4Addr> {
    if data.len() != 4 {
        return None;
    }
    Some(Ipv4Addr::new(data[0], data[1], data[2], data[3]))
}

/// IPCP: IPv4 network-layer negotiation (RFC 1332). We propose the address
/// `TunnelConfig` already assigned us plus the primary DNS it handed us,
/// and accept whatever the peer proposes for its own side.
pub struct IpcpNegotiator {
    pub local_addr: Ipv4Addr,
    pub primary_dns: Option<Ipv4Addr>,
    pub peer_addr: Option<Ipv4Addr>,
    pub peer_primary_dns: Option<Ipv4Addr>,
    pub peer_secondary_dns: Option<Ipv4Addr>,
}

impl IpcpNegotiator {
    pub fn new(local_addr: Ipv4Addr, primary_dns: Option<Ipv4Addr>) -> Self {
        Self { local_addr, primary_dns, peer_addr: None, peer_primary_dns: None, peer_secondary_dns: None }
    }
}

impl Negotiator for IpcpNegotiator {
    fn protocol(&self) -> u16 {
        vpncore_framing::PROTO_IPCP
    }

    fn name(&self) -> &'static str {
        "IPCP"
    }

    fn build_request(&mut self) -> Vec<(u8, Vec<u8>)> {
        let mut opts = vec![(OPT_IP_ADDRESS, encode_addr(self.local_addr))];
        if let Some(dns) = self.primary_dns {
            opts.push((OPT_PRIMARY_DNS, encode_addr(dns)));
        }
        opts
    }

    fn review_request(&mut self, peer_options: &[(u8, Vec<u8>)]) -> (ReplyCode, Vec<(u8, Vec<u8>)>) {
        let mut rejects = Vec::new();
        for (ty, data) in peer_options {
            match *ty {
                OPT_IP_ADDRESS => match decode_addr(data) {
                    Some(addr) => self.peer_addr = Some(addr),
                    None => rejects.push((*ty, data.clone())),
                },
                OPT_PRIMARY_DNS => match decode_addr(data) {
                    Some(addr) => self.peer_primary_dns = Some(addr),
                    None => rejects.push((*ty, data.clone())),
                },
                OPT_SECONDARY_DNS => match decode_addr(data) {
                    Some(addr) => self.peer_secondary_dns = Some(addr),
                    None => rejects.push((*ty, data.clone())),
                },
                OPT_PRIMARY_NBNS | OPT_SECONDARY_NBNS | OPT_IP_COMPRESSION => {}
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
            if *ty == OPT_IP_ADDRESS {
                if let Some(addr) = decode_addr(data) {
                    self.local_addr = addr;
                }
            }
        }
    }

    fn on_reject(&mut self, rejected_options: &[(u8, Vec<u8>)]) {
        for (ty, _) in rejected_options {
            if *ty == OPT_PRIMARY_DNS {
                self.primary_dns = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposes_assigned_address_and_dns() {
        let mut ipcp = IpcpNegotiator::new(Ipv4Addr::new(10, 1, 2, 3), Some(Ipv4Addr::new(8, 8, 8, 8)));
        let req = ipcp.build_request();
        assert!(req.contains(&(OPT_IP_ADDRESS, vec![10, 1, 2, 3])));
        assert!(req.contains(&(OPT_PRIMARY_DNS, vec![8, 8, 8, 8])));
    }

    #[test]
    fn accepts_peer_address_proposal() {
        let mut ipcp = IpcpNegotiator::new(Ipv4Addr::new(10, 0, 0, 1), None);
        let (code, _) = ipcp.review_request(&[(OPT_IP_ADDRESS, vec![192, 168, 1, 1])]);
        assert_eq!(code, ReplyCode::Ack);
        assert_eq!(ipcp.peer_addr, Some(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn nak_updates_requested_address() {
        let mut ipcp = IpcpNegotiator::new(Ipv4Addr::new(0, 0, 0, 0), None);
        ipcp.on_nak(&[(OPT_IP_ADDRESS, vec![10, 2, 3, 4])]);
        assert_eq!(ipcp.local_addr, Ipv4Addr::new(10, 2, 3, 4));
    }
}
