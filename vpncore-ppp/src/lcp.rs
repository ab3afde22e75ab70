use vpncore_framing::Accm;

use crate::negotiator::{Negotiator, ReplyCode};

pub const OPT_MRU: u8 = 1;
pub const OPT_ACCM: u8 = 2;
pub const OPT_AUTH_PROTOCOL: u8 = 3;
pub const OPT_MAGIC_NUMBER: u8 = 5;
pub const OPT_PFC: u8 = 7;
pub const OPT_ACFC: u8 = 8;

/// LCP: link-layer negotiation. We never send an `AuthProtocol` option
/// ourselves (the session is already authenticated over HTTPS) and reject
/// one outright if the peer proposes it.
pub struct LcpNegotiator {
    pub mru: u16,
    pub magic: u32,
    pub local_accm: Accm,
    pub include_pfc: bool,
    pub include_acfc: bool,

    /// ACCM we must respect when transmitting to the peer, learned from
    /// their Configure-Request.
    pub peer_accm: Accm,
    pub peer_mru: Option<u16>,
    pub auth_refused: bool,
}

impl LcpNegotiator {
    pub fn new(mru: u16) -> Self {
        Self {
            mru,
            magic: 0x524d_4f54,
            local_accm: Accm::default(),
            include_pfc: true,
            include_acfc: true,
            peer_accm: Accm::default(),
            peer_mru: None,
            auth_refused: false,
        }
    }
}

impl Negotiator for LcpNegotiator {
    fn protocol(&self) -> u16 {
        vpncore_framing::PROTO_LCP
    }

    fn name(&self) -> &'static str {
        "LCP"
    }

    fn build_request(&mut self) -> Vec<(u8, Vec<u8>)> {
        let mut opts = vec![
            (OPT_MRU, self.mru.to_be_bytes().to_vec()),
            (OPT_ACCM, self.local_accm.bits().to_be_bytes().to_vec()),
            (OPT_MAGIC_NUMBER, self.magic.to_be_bytes().to_vec()),
        ];
        if self.include_pfc {
            opts.push((OPT_PFC, Vec::new()));
        }
        if self.include_acfc {
            opts.push((OPT_ACFC, Vec::new()));
        }
        opts
    }

    fn review_request(&mut self, peer_options: &[(u8, Vec<u8>)]) -> (ReplyCode, Vec<(u8, Vec<u8>)>) {
        let mut rejects = Vec::new();
        for (ty, data) in peer_options {
            match *ty {
                OPT_MRU if data.len() == 2 => {
                    self.peer_mru = Some(u16::from_be_bytes([data[0], data[1]]));
                }
                OPT_ACCM if data.len() == 4 => {
                    self.peer_accm = Accm::new(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
                }
                OPT_MAGIC_NUMBER if data.len() == 4 => {}
                OPT_PFC | OPT_ACFC if data.is_empty() => {}
                OPT_AUTH_PROTOCOL => {
                    self.auth_refused = true;
                    rejects.push((*ty, data.clone()));
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
            match *ty {
                OPT_MRU if data.len() == 2 => self.mru = u16::from_be_bytes([data[0], data[1]]),
                OPT_ACCM if data.len() == 4 => self.local_accm = Accm::new(u32::from_be_bytes([data[0], data[1], data[2], data[3]])),
                OPT_MAGIC_NUMBER if data.len() == 4 => self.magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]).wrapping_add(1),
                _ => {}
            }
        }
    }

    fn on_reject(&mut self, rejected_options: &[(u8, Vec<u8>)]) {
        for (ty, _) in rejected_options {
            match *ty {
                OPT_PFC => self.include_pfc = false,
                OPT_ACFC => self.include_acfc = false,
                OPT_ACCM => self.local_accm = Accm::new(0),
                _ => {}
            }
        }
    }
}
