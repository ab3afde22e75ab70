use openssl::symm::Cipher;

use crate::error::CryptoError;

/// Block cipher used for the datagram-layer confidentiality transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EncAlg {
    Aes128Cbc,
    Aes256Cbc,
}

impl EncAlg {
    /// TunnelConfig carries this as a small integer tag from the
    /// authentication collaborator; anything else is `UnsupportedSuite`.
    pub fn from_tag(tag: u8) -> Result<Self, CryptoError> {
        match tag {
            0 => Ok(Self::Aes128Cbc),
            1 => Ok(Self::Aes256Cbc),
            _ => Err(CryptoError::UnsupportedSuite),
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes256Cbc => 32,
        }
    }

    pub(crate) fn cipher(self) -> Cipher {
        match self {
            Self::Aes128Cbc => Cipher::aes_128_cbc(),
            Self::Aes256Cbc => Cipher::aes_256_cbc(),
        }
    }
}

/// HMAC algorithm used for the datagram-layer integrity transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MacAlg {
    HmacMd5,
    HmacSha1,
}

impl MacAlg {
    pub fn from_tag(tag: u8) -> Result<Self, CryptoError> {
        match tag {
            0 => Ok(Self::HmacMd5),
            1 => Ok(Self::HmacSha1),
            _ => Err(CryptoError::UnsupportedSuite),
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Self::HmacMd5 => 16,
            Self::HmacSha1 => 20,
        }
    }

    pub(crate) fn digest(self) -> openssl::hash::MessageDigest {
        match self {
            Self::HmacMd5 => openssl::hash::MessageDigest::md5(),
            Self::HmacSha1 => openssl::hash::MessageDigest::sha1(),
        }
    }
}

/// Number of leading HMAC bytes carried as the packet authentication tag.
pub const TAG_LEN: usize = 12;
/// AES block size; also the CBC padding alignment.
pub const BLOCK_LEN: usize = 16;
/// Next-header value meaning "Legacy IP (IPv4)", appended after the CBC pad.
pub const NEXT_HEADER_IPV4: u8 = 0x04;
/// Next-header value meaning "IPv6".
pub const NEXT_HEADER_IPV6: u8 = 0x1c;
