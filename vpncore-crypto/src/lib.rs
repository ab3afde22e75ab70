//! Datagram-layer packet crypto and anti-replay, as used by the IPsec-like
//! encapsulation carried by the subset of dialects that support the
//! datagram transport. Confidentiality is AES-CBC; integrity is a
//! truncated HMAC; replay protection is a 64-entry sliding window.
//!
//! Grounded on the teacher's `aes-gmac-siv` crate's use of
//! `openssl::symm::{Crypter, Cipher, Mode}` for its own AES backend, and on
//! `core-crypto::zssp`'s per-direction `Counter`/`SessionKey` split between
//! outbound sequence state and inbound replay state.

mod ctx;
mod error;
mod replay;
mod suite;

pub use ctx::{InboundCrypto, OutboundCrypto};
pub use error::CryptoError;
pub use replay::ReplayWindow;
pub use suite::{EncAlg, MacAlg, BLOCK_LEN, NEXT_HEADER_IPV4, NEXT_HEADER_IPV6, TAG_LEN};

/// A matched pair of crypto contexts for one security association: what the
/// transport manager installs once the datagram parameters from
/// `TunnelConfig` are known.
pub struct CryptoPair {
    pub outbound: OutboundCrypto,
    pub inbound: InboundCrypto,
}

impl CryptoPair {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        enc_alg: EncAlg,
        mac_alg: MacAlg,
        outbound_spi: u32,
        outbound_enc_key: &[u8],
        outbound_mac_key: &[u8],
        outbound_iv: [u8; 16],
        inbound_spi: u32,
        inbound_enc_key: &[u8],
        inbound_mac_key: &[u8],
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            outbound: OutboundCrypto::new(enc_alg, mac_alg, outbound_enc_key, outbound_mac_key, outbound_spi, outbound_iv)?,
            inbound: InboundCrypto::new(enc_alg, mac_alg, inbound_enc_key, inbound_mac_key, inbound_spi)?,
        })
    }
}
