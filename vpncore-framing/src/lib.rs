//! Framing codecs sitting between the PPP state machine and the active
//! transport. Two dialects exist — byte-stuffed HDLC with a CRC-CCITT FCS,
//! and a length-prefixed framing used by the stream transport — and the PPP
//! layer is oblivious to which is active: both ultimately hand it a
//! `(protocol, payload)` pair.
//!
//! Grounded on the teacher's `vl1::endpoint::Endpoint` tagged-enum style for
//! representing alternative wire encodings side by side, and on
//! `vl1::protocol`'s convention of naming wire constants at module scope.

mod accm;
mod error;
mod fcs;
mod hdlc;
mod length_prefixed;

pub use accm::{Accm, ESCAPE, FLAG};
pub use error::FramingError;
pub use fcs::fcs16;
pub use hdlc::{decode as hdlc_decode, encode as hdlc_encode, HdlcDeframer};
pub use length_prefixed::LengthPrefixedFramer;

/// PPP protocol field value for Legacy IP (IPv4) data.
pub const PROTO_IP: u16 = 0x0021;
/// PPP protocol field value for IPv6 data.
pub const PROTO_IPV6: u16 = 0x0057;
/// PPP protocol field value for LCP control frames.
pub const PROTO_LCP: u16 = 0xC021;
/// PPP protocol field value for IPCP control frames.
pub const PROTO_IPCP: u16 = 0x8021;
/// PPP protocol field value for IPV6CP control frames.
pub const PROTO_IPV6CP: u16 = 0x8057;
