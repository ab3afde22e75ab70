use crate::accm::{escape_into, Accm, ESCAPE, FLAG};
use crate::error::FramingError;
use crate::fcs::fcs16;

/// Byte-stuff `protocol || payload` between two `0x7E` flags, escaping any
/// ACCM-listed byte, and append a 16-bit FCS computed over the unescaped
/// content.
pub fn encode(protocol: u16, payload: &[u8], accm: Accm) -> Vec<u8> {
    let mut content = Vec::with_capacity(2 + payload.len());
    content.extend_from_slice(&protocol.to_be_bytes());
    content.extend_from_slice(payload);
    let fcs = fcs16(&content);

    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(FLAG);
    for &b in &content {
        escape_into(&mut out, accm, b);
    }
    for &b in &fcs.to_le_bytes() {
        escape_into(&mut out, accm, b);
    }
    out.push(FLAG);
    out
}

/// Decode a single frame, including its bracketing `0x7E` flags. Ignores
/// any bytes before the first flag (re-synchronization), matching the
/// spec's "re-synchronize on any 0x7E" receive behavior.
pub fn decode(framed: &[u8]) -> Result<(u16, Vec<u8>), FramingError> {
    let start = framed.iter().position(|&b| b == FLAG).ok_or(FramingError::Truncated)?;
    let rest = &framed[start + 1..];
    let end = rest.iter().position(|&b| b == FLAG).ok_or(FramingError::Truncated)?;
    let body = &rest[..end];

    let mut unescaped = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i] == ESCAPE {
            if i + 1 >= body.len() {
                return Err(FramingError::Truncated);
            }
            unescaped.push(body[i + 1] ^ 0x20);
            i += 2;
        } else {
            unescaped.push(body[i]);
            i += 1;
        }
    }

    if unescaped.len() < 4 {
        return Err(FramingError::Truncated);
    }
    let (content, fcs_bytes) = unescaped.split_at(unescaped.len() - 2);
    let received_fcs = u16::from_le_bytes([fcs_bytes[0], fcs_bytes[1]]);
    if fcs16(content) != received_fcs {
        return Err(FramingError::FcsMismatch);
    }
    if content.len() < 2 {
        return Err(FramingError::Truncated);
    }
    let protocol = u16::from_be_bytes([content[0], content[1]]);
    Ok((protocol, content[2..].to_vec()))
}

/// Stateful byte-stream deframer for transports that hand us a raw,
/// unsegmented stream of HDLC-framed bytes rather than whole frames.
#[derive(Default)]
pub struct HdlcDeframer {
    buf: Vec<u8>,
}

impl HdlcDeframer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed newly-received bytes; returns every complete frame found,
    /// discarding anything before the first flag the way a real receiver
    /// resynchronizes on line noise.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<(u16, Vec<u8>), FramingError>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            let Some(first) = self.buf.iter().position(|&b| b == FLAG) else {
                self.buf.clear();
                break;
            };
            let Some(second_rel) = self.buf[first + 1..].iter().position(|&b| b == FLAG) else {
                // Incomplete frame; keep buffered bytes from the first flag onward.
                self.buf.drain(..first);
                break;
            };
            let second = first + 1 + second_rel;
            if second == first + 1 {
                // Back-to-back flags (empty frame / keepalive flag fill); skip it.
                self.buf.drain(..=first);
                continue;
            }
            let frame: Vec<u8> = self.buf[first..=second].to_vec();
            self.buf.drain(..=second);
            out.push(decode(&frame));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_any_byte_sequence() {
        let accm = Accm::default();
        for len in [0usize, 1, 2, 63, 1500] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
            let framed = encode(0x0021, &payload, accm);
            assert_eq!(framed.iter().filter(|&&b| b == FLAG).count(), 2);
            let (protocol, decoded) = decode(&framed).unwrap();
            assert_eq!(protocol, 0x0021);
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn rejects_corrupted_fcs() {
        let accm = Accm::default();
        let mut framed = encode(0x0021, b"hello", accm);
        let mid = framed.len() / 2;
        framed[mid] ^= 0xFF;
        // A corrupted byte might itself be a flag or escape; only assert on
        // frames that still parse as exactly one frame.
        if let Ok((_, _)) = decode(&framed) {
            // Extremely unlikely collision in the FCS; if it happens, the
            // corruption must have produced an identical byte stream, which
            // `framed[mid] ^= 0xFF` cannot do, so treat this branch as
            // unreachable in practice.
            panic!("expected FCS mismatch to be detected");
        }
    }

    #[test]
    fn streaming_deframer_finds_frames_split_across_feeds() {
        let accm = Accm::default();
        let framed = encode(0x8021, b"ipcp-config-request", accm);
        let mut deframer = HdlcDeframer::new();
        let (first_half, second_half) = framed.split_at(framed.len() / 2);
        assert!(deframer.feed(first_half).is_empty());
        let frames = deframer.feed(second_half);
        assert_eq!(frames.len(), 1);
        let (protocol, payload) = frames[0].as_ref().unwrap();
        assert_eq!(*protocol, 0x8021);
        assert_eq!(payload, b"ipcp-config-request");
    }

    #[test]
    fn resynchronizes_past_line_noise() {
        let accm = Accm::default();
        let framed = encode(0x0021, b"data", accm);
        let mut noisy = vec![0x00, 0x11, 0x22];
        noisy.extend_from_slice(&framed);
        let mut deframer = HdlcDeframer::new();
        let frames = deframer.feed(&noisy);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_ok());
    }
}
