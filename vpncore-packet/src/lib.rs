//! Packet buffer and queue primitives shared by every layer of the tunnel
//! engine. Mirrors the fixed-capacity, head/tail-room-reserving buffer used
//! throughout the teacher stack rather than reaching for general-purpose
//! growable byte vectors on the hot path.

mod queue;

pub use queue::{Queue, QueuePolicy, QueueStats};

/// Worst case stacked header overhead: datagram security header (SPI + seq +
/// IV + HMAC tag, see `vpncore-crypto`) + length-prefixed framing prefix +
/// PPP address/control/protocol fields.
pub const HEAD_ROOM: usize = 4 + 4 + 16 + 12 + 8 + 4;

/// Worst case trailing overhead: CBC padding (up to one full block) plus the
/// pad-length and next-header bytes.
pub const TAIL_ROOM: usize = 17;

/// Largest payload we are ever asked to carry, plus the head/tail room
/// above. Comfortably covers a 1500-byte Ethernet MTU with room to spare for
/// oversized or jumbo configurations.
pub const CAPACITY: usize = 2048;

/// Identifies where a packet came from, so that stray control frames that
/// arrive after a queue drain (e.g. a late LCP echo reply racing session
/// teardown) can still be routed or discarded correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Read from the local virtual interface (outbound IP traffic).
    Interface,
    /// Read from the stream transport.
    Stream,
    /// Read from the datagram transport.
    Datagram,
    /// Synthesized internally (keepalives, PPP control frames).
    Internal,
}

/// A fixed-capacity packet buffer with reserved head- and tail-room.
///
/// The payload occupies `data[start..start+len]`. Prepending a header grows
/// the window backwards into head-room without copying; appending a trailer
/// grows it forward into tail-room. Both are bounds-checked and return
/// `None` rather than panicking so that a confused peer sending an
/// oversized frame cannot panic the event loop.
#[derive(Clone)]
pub struct Packet {
    data: [u8; CAPACITY],
    start: usize,
    len: usize,
    pub origin: Origin,
    /// Set while the packet is linked into a `Queue`; cleared on pop.
    queue_slot: Option<usize>,
}

impl Packet {
    /// A new, empty packet with head-room reserved and no payload.
    pub fn new(origin: Origin) -> Self {
        Self { data: [0u8; CAPACITY], start: HEAD_ROOM, len: 0, origin, queue_slot: None }
    }

    /// Build a packet from an existing payload, copying it in at the
    /// reserved offset. Returns `None` if the payload cannot possibly fit
    /// with both head- and tail-room reserved.
    pub fn from_payload(origin: Origin, payload: &[u8]) -> Option<Self> {
        if payload.len() > CAPACITY - HEAD_ROOM - TAIL_ROOM {
            return None;
        }
        let mut p = Self::new(origin);
        p.data[HEAD_ROOM..HEAD_ROOM + payload.len()].copy_from_slice(payload);
        p.len = payload.len();
        Some(p)
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[self.start..self.start + self.len]
    }

    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.start..self.start + self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of head-room still available ahead of the payload.
    #[inline]
    pub fn head_available(&self) -> usize {
        self.start
    }

    /// Bytes of tail-room still available after the payload.
    #[inline]
    pub fn tail_available(&self) -> usize {
        CAPACITY - self.start - self.len
    }

    /// Prepend `header` directly in front of the current payload. Fails if
    /// there isn't enough head-room left, which would indicate a framing
    /// bug (stacked headers exceeding `HEAD_ROOM`) rather than a user error.
    pub fn push_header(&mut self, header: &[u8]) -> Result<(), PacketError> {
        if header.len() > self.head_available() {
            return Err(PacketError::NoHeadRoom);
        }
        let new_start = self.start - header.len();
        self.data[new_start..self.start].copy_from_slice(header);
        self.start = new_start;
        self.len += header.len();
        Ok(())
    }

    /// Append `trailer` directly after the current payload.
    pub fn push_trailer(&mut self, trailer: &[u8]) -> Result<(), PacketError> {
        if trailer.len() > self.tail_available() {
            return Err(PacketError::NoTailRoom);
        }
        let end = self.start + self.len;
        self.data[end..end + trailer.len()].copy_from_slice(trailer);
        self.len += trailer.len();
        Ok(())
    }

    /// Strip `n` bytes from the front of the payload (e.g. removing a PPP
    /// header before handing the remainder to the interface).
    pub fn strip_prefix(&mut self, n: usize) -> Result<(), PacketError> {
        if n > self.len {
            return Err(PacketError::Underflow);
        }
        self.start += n;
        self.len -= n;
        Ok(())
    }

    /// Strip `n` bytes from the end of the payload.
    pub fn truncate_by(&mut self, n: usize) -> Result<(), PacketError> {
        if n > self.len {
            return Err(PacketError::Underflow);
        }
        self.len -= n;
        Ok(())
    }

    /// Current position in whatever `Queue` this packet is linked into, if
    /// any. `None` once popped.
    #[inline]
    pub fn queue_slot(&self) -> Option<usize> {
        self.queue_slot
    }

    /// Replace the payload in place, keeping the same head-room offset.
    /// Used after in-place CBC decryption shrinks the packet by the pad.
    pub fn set_len(&mut self, new_len: usize) -> Result<(), PacketError> {
        if self.start + new_len > CAPACITY {
            return Err(PacketError::NoTailRoom);
        }
        self.len = new_len;
        Ok(())
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet").field("origin", &self.origin).field("len", &self.len).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    NoHeadRoom,
    NoTailRoom,
    Underflow,
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoHeadRoom => f.write_str("NoHeadRoom"),
            Self::NoTailRoom => f.write_str("NoTailRoom"),
            Self::Underflow => f.write_str("Underflow"),
        }
    }
}

impl std::error::Error for PacketError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payload() {
        let p = Packet::from_payload(Origin::Interface, b"hello").unwrap();
        assert_eq!(p.payload(), b"hello");
        assert_eq!(p.len(), 5);
    }

    #[test]
    fn push_header_and_trailer() {
        let mut p = Packet::from_payload(Origin::Interface, b"payload").unwrap();
        p.push_header(b"HDR").unwrap();
        p.push_trailer(b"TRL").unwrap();
        assert_eq!(p.payload(), b"HDRpayloadTRL");
    }

    #[test]
    fn strip_prefix_and_truncate() {
        let mut p = Packet::from_payload(Origin::Stream, b"HDRpayloadTRL").unwrap();
        p.strip_prefix(3).unwrap();
        p.truncate_by(3).unwrap();
        assert_eq!(p.payload(), b"payload");
    }

    #[test]
    fn refuses_oversized_payload() {
        let huge = vec![0u8; CAPACITY];
        assert!(Packet::from_payload(Origin::Interface, &huge).is_none());
    }

    #[test]
    fn refuses_header_exceeding_headroom() {
        let mut p = Packet::new(Origin::Internal);
        let oversized = vec![0u8; HEAD_ROOM + 1];
        assert_eq!(p.push_header(&oversized), Err(PacketError::NoHeadRoom));
    }
}
