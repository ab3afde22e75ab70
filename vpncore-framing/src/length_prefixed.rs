use crate::error::FramingError;

/// `(len: u16 BE) || magic || protocol (u16 BE) || payload`, where `len`
/// counts every byte following the length field itself. `magic` is a fixed,
/// dialect-specific tag (e.g. the literal bytes `0x50 0x50`, or a longer
/// cookie some dialects use instead).
#[derive(Clone)]
pub struct LengthPrefixedFramer {
    magic: Vec<u8>,
    mtu: usize,
}

impl LengthPrefixedFramer {
    pub fn new(magic: Vec<u8>, mtu: usize) -> Self {
        Self { magic, mtu }
    }

    fn overhead(&self) -> usize {
        self.magic.len() + 2
    }

    pub fn encode(&self, protocol: u16, payload: &[u8]) -> Vec<u8> {
        let body_len = self.overhead() + payload.len();
        let mut out = Vec::with_capacity(2 + body_len);
        out.extend_from_slice(&(body_len as u16).to_be_bytes());
        out.extend_from_slice(&self.magic);
        out.extend_from_slice(&protocol.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Decode a single complete frame (length prefix included).
    pub fn decode(&self, frame: &[u8]) -> Result<(u16, Vec<u8>), FramingError> {
        if frame.len() < 2 {
            return Err(FramingError::Truncated);
        }
        let declared_len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        if declared_len > self.mtu + self.overhead() {
            return Err(FramingError::InvalidLength);
        }
        let body = &frame[2..];
        if body.len() != declared_len {
            return Err(FramingError::Truncated);
        }
        if body.len() < self.overhead() {
            return Err(FramingError::Truncated);
        }
        if &body[..self.magic.len()] != self.magic.as_slice() {
            return Err(FramingError::BadMagic);
        }
        let protocol = u16::from_be_bytes([body[self.magic.len()], body[self.magic.len() + 1]]);
        Ok((protocol, body[self.magic.len() + 2..].to_vec()))
    }

    /// Given the front of a byte stream, report how many bytes the next
    /// complete frame needs in total (length prefix included), or `None` if
    /// not even the 2-byte length prefix has arrived yet. Used by the
    /// stream transport to find frame boundaries during reassembly.
    pub fn next_frame_len(&self, buffered: &[u8]) -> Option<usize> {
        if buffered.len() < 2 {
            return None;
        }
        let declared_len = u16::from_be_bytes([buffered[0], buffered[1]]) as usize;
        Some(2 + declared_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer() -> LengthPrefixedFramer {
        LengthPrefixedFramer::new(vec![0x50, 0x50], 1500)
    }

    #[test]
    fn round_trips() {
        let f = framer();
        let encoded = f.encode(0x0021, b"hello world");
        let (protocol, payload) = f.decode(&encoded).unwrap();
        assert_eq!(protocol, 0x0021);
        assert_eq!(payload, b"hello world");
    }

    #[test]
    fn rejects_oversized_length() {
        let f = framer();
        let mut encoded = f.encode(0x0021, &vec![0u8; 100]);
        encoded[0..2].copy_from_slice(&(f.mtu as u16 + 1000).to_be_bytes());
        assert_eq!(f.decode(&encoded), Err(FramingError::InvalidLength));
    }

    #[test]
    fn rejects_bad_magic() {
        let f = framer();
        let mut encoded = f.encode(0x0021, b"x");
        encoded[2] ^= 0xFF;
        assert_eq!(f.decode(&encoded), Err(FramingError::BadMagic));
    }

    #[test]
    fn next_frame_len_reports_total_size() {
        let f = framer();
        let encoded = f.encode(0x8021, b"config");
        assert_eq!(f.next_frame_len(&encoded[..2]), Some(encoded.len()));
        assert_eq!(f.next_frame_len(&encoded[..1]), None);
    }
}
