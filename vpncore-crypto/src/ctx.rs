use openssl::hash::MessageDigest;
use openssl::memcmp;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use openssl::symm::{Cipher, Crypter, Mode};

use crate::error::CryptoError;
use crate::replay::ReplayWindow;
use crate::suite::{BLOCK_LEN, NEXT_HEADER_IPV4, TAG_LEN};
use crate::{EncAlg, MacAlg};

struct CipherParams {
    enc_alg: EncAlg,
    mac_alg: MacAlg,
    enc_key: Vec<u8>,
    mac_key: Vec<u8>,
}

impl CipherParams {
    fn new(enc_alg: EncAlg, mac_alg: MacAlg, enc_key: &[u8], mac_key: &[u8]) -> Result<Self, CryptoError> {
        if enc_key.len() != enc_alg.key_len() || mac_key.len() != mac_alg.key_len() {
            return Err(CryptoError::UnsupportedSuite);
        }
        Ok(Self { enc_alg, mac_alg, enc_key: enc_key.to_vec(), mac_key: mac_key.to_vec() })
    }

    fn hmac(&self, parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
        let pkey = PKey::hmac(&self.mac_key).map_err(|_| CryptoError::UnsupportedSuite)?;
        let mut signer = Signer::new(digest_for(self.mac_alg), &pkey).map_err(|_| CryptoError::UnsupportedSuite)?;
        for part in parts {
            signer.update(part).map_err(|_| CryptoError::UnsupportedSuite)?;
        }
        signer.sign_to_vec().map_err(|_| CryptoError::UnsupportedSuite)
    }
}

fn digest_for(alg: MacAlg) -> MessageDigest {
    alg.digest()
}

/// Per-direction outbound crypto state: block cipher key, HMAC key, the
/// mutable chained IV, the SPI identifying this security association, and
/// the 32-bit outbound sequence counter.
pub struct OutboundCrypto {
    params: CipherParams,
    spi: u32,
    iv: [u8; 16],
    seq: u32,
    wrapped: bool,
}

impl OutboundCrypto {
    pub fn new(enc_alg: EncAlg, mac_alg: MacAlg, enc_key: &[u8], mac_key: &[u8], spi: u32, initial_iv: [u8; 16]) -> Result<Self, CryptoError> {
        Ok(Self { params: CipherParams::new(enc_alg, mac_alg, enc_key, mac_key)?, spi, iv: initial_iv, seq: 0, wrapped: false })
    }

    /// Encrypt and authenticate one IP packet, producing the full wire
    /// encapsulation: `SPI(4) || SEQ(4) || IV(16) || ciphertext || TAG(12)`.
    pub fn encrypt(&mut self, plaintext: &[u8], next_header: u8) -> Result<Vec<u8>, CryptoError> {
        if self.wrapped {
            return Err(CryptoError::SeqWrapped);
        }

        // PKCS-style pad: 1,2,...,padlen, then padlen byte, then next-header byte.
        let unpadded_trailer = plaintext.len() + 2;
        let padlen = (BLOCK_LEN - (unpadded_trailer % BLOCK_LEN)) % BLOCK_LEN;
        let mut padded = Vec::with_capacity(plaintext.len() + padlen + 2);
        padded.extend_from_slice(plaintext);
        for i in 1..=padlen {
            padded.push(i as u8);
        }
        padded.push(padlen as u8);
        padded.push(next_header);
        debug_assert_eq!(padded.len() % BLOCK_LEN, 0);

        let cipher = self.params.enc_alg.cipher();
        let mut crypter = Crypter::new(cipher, Mode::Encrypt, &self.params.enc_key, Some(&self.iv)).map_err(|_| CryptoError::UnsupportedSuite)?;
        crypter.pad(false);
        let mut ciphertext = vec![0u8; padded.len() + Cipher::aes_256_cbc().block_size()];
        let mut count = crypter.update(&padded, &mut ciphertext).map_err(|_| CryptoError::Malformed)?;
        count += crypter.finalize(&mut ciphertext[count..]).map_err(|_| CryptoError::Malformed)?;
        ciphertext.truncate(count);

        let seq = self.seq;
        let spi_be = self.spi.to_be_bytes();
        let seq_be = seq.to_be_bytes();
        let hmac = self.params.hmac(&[&spi_be, &seq_be, &self.iv, &ciphertext])?;

        let mut wire = Vec::with_capacity(4 + 4 + 16 + ciphertext.len() + TAG_LEN);
        wire.extend_from_slice(&spi_be);
        wire.extend_from_slice(&seq_be);
        wire.extend_from_slice(&self.iv);
        wire.extend_from_slice(&ciphertext);
        wire.extend_from_slice(&hmac[..TAG_LEN]);

        // Explicit-IV chaining: the last ciphertext block becomes the next IV.
        self.iv.copy_from_slice(&ciphertext[ciphertext.len() - BLOCK_LEN..]);

        match self.seq.checked_add(1) {
            Some(next) => self.seq = next,
            None => self.wrapped = true,
        }

        Ok(wire)
    }

    pub fn spi(&self) -> u32 {
        self.spi
    }
}

/// Per-direction inbound crypto state: same key material, but tracks an
/// anti-replay window instead of a counter.
pub struct InboundCrypto {
    params: CipherParams,
    spi: u32,
    replay: ReplayWindow,
}

impl InboundCrypto {
    pub fn new(enc_alg: EncAlg, mac_alg: MacAlg, enc_key: &[u8], mac_key: &[u8], spi: u32) -> Result<Self, CryptoError> {
        Ok(Self { params: CipherParams::new(enc_alg, mac_alg, enc_key, mac_key)?, spi, replay: ReplayWindow::new() })
    }

    pub fn spi(&self) -> u32 {
        self.spi
    }

    /// Verify and decrypt one wire packet, returning `(next_header,
    /// plaintext)`. Per-packet failures (`BadHmac`, `Replay`, `Malformed`)
    /// are the caller's to drop silently and count; they never represent a
    /// fatal session error.
    pub fn decrypt(&mut self, wire: &[u8]) -> Result<(u8, Vec<u8>), CryptoError> {
        if wire.len() < 4 + 4 + 16 + TAG_LEN + BLOCK_LEN {
            return Err(CryptoError::Malformed);
        }
        let (header, rest) = wire.split_at(24);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::Malformed);
        }
        let spi = u32::from_be_bytes(header[0..4].try_into().unwrap());
        let seq = u32::from_be_bytes(header[4..8].try_into().unwrap());
        let iv: [u8; 16] = header[8..24].try_into().unwrap();
        if spi != self.spi {
            return Err(CryptoError::Malformed);
        }

        let expected = self.params.hmac(&[&header[0..4], &header[4..8], &iv, ciphertext])?;
        if !memcmp::eq(&expected[..TAG_LEN], tag) {
            return Err(CryptoError::BadHmac);
        }

        if !self.replay.check_and_update(seq) {
            return Err(CryptoError::Replay);
        }

        let cipher = self.params.enc_alg.cipher();
        let mut crypter = Crypter::new(cipher, Mode::Decrypt, &self.params.enc_key, Some(&iv)).map_err(|_| CryptoError::Malformed)?;
        crypter.pad(false);
        let mut padded = vec![0u8; ciphertext.len() + BLOCK_LEN];
        let mut count = crypter.update(ciphertext, &mut padded).map_err(|_| CryptoError::Malformed)?;
        count += crypter.finalize(&mut padded[count..]).map_err(|_| CryptoError::Malformed)?;
        padded.truncate(count);

        if padded.len() < 2 {
            return Err(CryptoError::Malformed);
        }
        let next_header = padded[padded.len() - 1];
        let padlen = padded[padded.len() - 2] as usize;
        if padlen + 2 > padded.len() {
            return Err(CryptoError::Malformed);
        }
        padded.truncate(padded.len() - padlen - 2);

        Ok((next_header, padded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (OutboundCrypto, InboundCrypto) {
        let enc_key = [0x11u8; 16];
        let mac_key = [0x22u8; 16];
        let out = OutboundCrypto::new(EncAlg::Aes128Cbc, MacAlg::HmacMd5, &enc_key, &mac_key, 0xdead_beef, [0u8; 16]).unwrap();
        let inb = InboundCrypto::new(EncAlg::Aes128Cbc, MacAlg::HmacMd5, &enc_key, &mac_key, 0xdead_beef).unwrap();
        (out, inb)
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let (mut out, mut inb) = pair();
        let plaintext = b"hello tunnel traffic, this is an IP packet payload";
        let wire = out.encrypt(plaintext, NEXT_HEADER_IPV4).unwrap();
        let (nh, recovered) = inb.decrypt(&wire).unwrap();
        assert_eq!(nh, NEXT_HEADER_IPV4);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn sequence_increments_and_iv_chains() {
        let (mut out, mut inb) = pair();
        let p1 = out.encrypt(b"packet one", NEXT_HEADER_IPV4).unwrap();
        let p2 = out.encrypt(b"packet two", NEXT_HEADER_IPV4).unwrap();
        assert_ne!(&p1[8..24], &p2[8..24], "chained IV must change between packets");
        let (_, r1) = inb.decrypt(&p1).unwrap();
        let (_, r2) = inb.decrypt(&p2).unwrap();
        assert_eq!(r1, b"packet one");
        assert_eq!(r2, b"packet two");
    }

    #[test]
    fn bad_hmac_rejected() {
        let (mut out, mut inb) = pair();
        let mut wire = out.encrypt(b"tamper me", NEXT_HEADER_IPV4).unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        assert_eq!(inb.decrypt(&wire), Err(CryptoError::BadHmac));
    }

    #[test]
    fn replay_rejected() {
        let (mut out, mut inb) = pair();
        let wire = out.encrypt(b"replay me", NEXT_HEADER_IPV4).unwrap();
        assert!(inb.decrypt(&wire).is_ok());
        assert_eq!(inb.decrypt(&wire), Err(CryptoError::Replay));
    }

    #[test]
    fn unsupported_suite_rejected_at_init() {
        let bad_key = [0u8; 5];
        assert_eq!(OutboundCrypto::new(EncAlg::Aes128Cbc, MacAlg::HmacMd5, &bad_key, &[0u8; 16], 1, [0u8; 16]).unwrap_err(), CryptoError::UnsupportedSuite);
    }

    #[test]
    fn seq_wrapped_is_fatal() {
        let (mut out, _inb) = pair();
        out.seq = u32::MAX;
        assert!(out.encrypt(b"last one", NEXT_HEADER_IPV4).is_ok());
        assert_eq!(out.encrypt(b"never sent", NEXT_HEADER_IPV4), Err(CryptoError::SeqWrapped));
    }
}
