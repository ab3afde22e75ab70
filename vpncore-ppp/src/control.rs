/// PPP control-packet codes shared by LCP/IPCP/IPV6CP (RFC 1661 §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    ConfigureRequest = 1,
    ConfigureAck = 2,
    ConfigureNak = 3,
    ConfigureReject = 4,
    TerminateRequest = 5,
    TerminateAck = 6,
    CodeReject = 7,
    ProtocolReject = 8,
    EchoRequest = 9,
    EchoReply = 10,
    DiscardRequest = 11,
}

impl Code {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::ConfigureRequest,
            2 => Self::ConfigureAck,
            3 => Self::ConfigureNak,
            4 => Self::ConfigureReject,
            5 => Self::TerminateRequest,
            6 => Self::TerminateAck,
            7 => Self::CodeReject,
            8 => Self::ProtocolReject,
            9 => Self::EchoRequest,
            10 => Self::EchoReply,
            11 => Self::DiscardRequest,
            _ => return None,
        })
    }
}

/// One control packet: `Code(1) Identifier(1) Length(2 BE) Data`, where
/// `Length` counts the whole packet including this header.
#[derive(Debug, Clone)]
pub struct ControlPacket {
    pub code: Code,
    pub identifier: u8,
    pub data: Vec<u8>,
}

impl ControlPacket {
    pub fn encode(&self) -> Vec<u8> {
        let len = 4 + self.data.len();
        let mut out = Vec::with_capacity(len);
        out.push(self.code as u8);
        out.push(self.identifier);
        out.extend_from_slice(&(len as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let code = Code::from_u8(bytes[0])?;
        let identifier = bytes[1];
        let len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if len > bytes.len() || len < 4 {
            return None;
        }
        Some(Self { code, identifier, data: bytes[4..len].to_vec() })
    }
}

/// Parse a `Type(1) Length(1) Data` option TLV stream into `(type, data)`
/// pairs. `Length` counts the 2-byte header too.
pub fn parse_options(mut bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut out = Vec::new();
    while bytes.len() >= 2 {
        let ty = bytes[0];
        let len = bytes[1] as usize;
        if len < 2 || len > bytes.len() {
            break;
        }
        out.push((ty, bytes[2..len].to_vec()));
        bytes = &bytes[len..];
    }
    out
}

pub fn encode_options(options: &[(u8, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (ty, data) in options {
        out.push(*ty);
        out.push((2 + data.len()) as u8);
        out.extend_from_slice(data);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_packet_round_trips() {
        let pkt = ControlPacket { code: Code::ConfigureRequest, identifier: 7, data: vec![1, 4, 0, 0, 5, 220] };
        let encoded = pkt.encode();
        let decoded = ControlPacket::decode(&encoded).unwrap();
        assert_eq!(decoded.code, Code::ConfigureRequest);
        assert_eq!(decoded.identifier, 7);
        assert_eq!(decoded.data, pkt.data);
    }

    #[test]
    fn options_round_trip() {
        let opts = vec![(1u8, vec![0u8, 0, 5, 220]), (5u8, vec![1, 2, 3, 4])];
        let encoded = encode_options(&opts);
        assert_eq!(parse_options(&encoded), opts);
    }
}
