//! Ethernet, ARP, IPv4, and ICMP wire codecs.
//!
//! Parsers return a typed view built from a borrowed byte slice at fixed
//! offsets; emitters write into a caller-provided buffer in network byte
//! order, four small fixed-length headers done field-by-field with no
//! parser-combinator or serde machinery.

use std::net::Ipv4Addr;

use mac_address::MacAddress;

use super::checksum::{internet_checksum, verify_checksum};
use super::errors::RouterError;

pub const ETH_HEADER_LEN: usize = 14;
pub const ARP_PACKET_LEN: usize = 28;
pub const IPV4_HEADER_LEN: usize = 20;
pub const ICMP_HEADER_LEN: usize = 4;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;

pub const ARP_HTYPE_ETHERNET: u16 = 1;
pub const ARP_PTYPE_IPV4: u16 = 0x0800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOperation {
    Request,
    Reply,
}

#[derive(Debug, Clone, Copy)]
pub struct EthernetHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < ETH_HEADER_LEN {
            return Err(RouterError::Malformed("ethernet frame too short"));
        }
        Ok(Self {
            dst: MacAddress::new(buf[0..6].try_into().unwrap()),
            src: MacAddress::new(buf[6..12].try_into().unwrap()),
            ethertype: u16::from_be_bytes([buf[12], buf[13]]),
        })
    }

    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.dst.bytes());
        buf[6..12].copy_from_slice(&self.src.bytes());
        buf[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
    }
}

pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

#[derive(Debug, Clone, Copy)]
pub struct ArpPacket {
    pub operation: ArpOperation,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < ARP_PACKET_LEN {
            return Err(RouterError::Malformed("arp packet too short"));
        }
        let htype = u16::from_be_bytes([buf[0], buf[1]]);
        let ptype = u16::from_be_bytes([buf[2], buf[3]]);
        let hlen = buf[4];
        let plen = buf[5];
        if htype != ARP_HTYPE_ETHERNET || ptype != ARP_PTYPE_IPV4 || hlen != 6 || plen != 4 {
            return Err(RouterError::Malformed("unsupported arp hw/proto type"));
        }
        let operation = match u16::from_be_bytes([buf[6], buf[7]]) {
            1 => ArpOperation::Request,
            2 => ArpOperation::Reply,
            _ => return Err(RouterError::Malformed("unknown arp opcode")),
        };
        Ok(Self {
            operation,
            sender_mac: MacAddress::new(buf[8..14].try_into().unwrap()),
            sender_ip: Ipv4Addr::new(buf[14], buf[15], buf[16], buf[17]),
            target_mac: MacAddress::new(buf[18..24].try_into().unwrap()),
            target_ip: Ipv4Addr::new(buf[24], buf[25], buf[26], buf[27]),
        })
    }

    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        let op: u16 = match self.operation {
            ArpOperation::Request => 1,
            ArpOperation::Reply => 2,
        };
        buf[6..8].copy_from_slice(&op.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.bytes());
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.bytes());
        buf[24..28].copy_from_slice(&self.target_ip.octets());
    }

    /// Builds a full Ethernet+ARP frame, broadcasting at layer 2 for
    /// requests.
    pub fn build_frame(&self, src_mac: MacAddress) -> Vec<u8> {
        let dst_mac = match self.operation {
            ArpOperation::Request => MacAddress::new(BROADCAST_MAC),
            ArpOperation::Reply => self.target_mac,
        };
        let mut frame = vec![0u8; ETH_HEADER_LEN + ARP_PACKET_LEN];
        EthernetHeader { dst: dst_mac, src: src_mac, ethertype: ETHERTYPE_ARP }.emit(&mut frame[0..ETH_HEADER_LEN]);
        self.emit(&mut frame[ETH_HEADER_LEN..]);
        frame
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header {
    pub tos: u8,
    pub total_len: u16,
    pub id: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_PWOSPF: u8 = 89;

impl Ipv4Header {
    /// Rejects version != 4, IHL != 5, MF/fragment-offset set, or a bad
    /// checksum.
    pub fn parse(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < IPV4_HEADER_LEN {
            return Err(RouterError::Malformed("ipv4 header too short"));
        }
        let version = buf[0] >> 4;
        let ihl = buf[0] & 0x0f;
        if version != 4 {
            return Err(RouterError::Malformed("not ipv4"));
        }
        if ihl != 5 {
            return Err(RouterError::Malformed("ipv4 options unsupported"));
        }
        let flags_frag = u16::from_be_bytes([buf[6], buf[7]]);
        let more_fragments = flags_frag & 0x2000 != 0;
        let frag_offset = flags_frag & 0x1fff;
        if more_fragments || frag_offset != 0 {
            return Err(RouterError::Malformed("fragmentation unsupported"));
        }
        if !verify_checksum(&buf[0..IPV4_HEADER_LEN], 10) {
            return Err(RouterError::Malformed("bad ipv4 checksum"));
        }
        Ok(Self {
            tos: buf[1],
            total_len: u16::from_be_bytes([buf[2], buf[3]]),
            id: u16::from_be_bytes([buf[4], buf[5]]),
            ttl: buf[8],
            protocol: buf[9],
            checksum: u16::from_be_bytes([buf[10], buf[11]]),
            src: Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]),
            dst: Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]),
        })
    }

    pub fn emit(&self, buf: &mut [u8]) {
        buf[0] = 0x45;
        buf[1] = self.tos;
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.id.to_be_bytes());
        buf[6..8].copy_from_slice(&[0, 0]);
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&[0, 0]);
        buf[12..16].copy_from_slice(&self.src.octets());
        buf[16..20].copy_from_slice(&self.dst.octets());
        let csum = internet_checksum(&buf[0..IPV4_HEADER_LEN]);
        buf[10..12].copy_from_slice(&csum.to_be_bytes());
    }

    /// Decrements TTL and recomputes the checksum ("zero then sum") in
    /// place over the caller's buffer.
    pub fn decrement_ttl_and_reseal(&mut self, buf: &mut [u8]) {
        self.ttl -= 1;
        buf[8] = self.ttl;
        buf[10..12].copy_from_slice(&[0, 0]);
        let csum = internet_checksum(&buf[0..IPV4_HEADER_LEN]);
        buf[10..12].copy_from_slice(&csum.to_be_bytes());
        self.checksum = csum;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply,
    DestUnreachable { code: u8 },
    TimeExceeded,
    EchoRequest,
}

pub const ICMP_CODE_NET_UNREACHABLE: u8 = 0;
pub const ICMP_CODE_HOST_UNREACHABLE: u8 = 1;
pub const ICMP_CODE_PROTOCOL_UNREACHABLE: u8 = 2;
pub const ICMP_CODE_PORT_UNREACHABLE: u8 = 3;
/// No routing table match, distinct on the wire from the loopback-prevention
/// "net unreachable" (code 0).
pub const ICMP_CODE_NET_UNKNOWN: u8 = 6;

#[derive(Debug, Clone)]
pub struct IcmpPacket {
    pub kind: IcmpType,
    /// Echo id+sequence for echo packets; zeroed for error packets.
    pub rest_of_header: [u8; 4],
    pub payload: Vec<u8>,
}

impl IcmpPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < ICMP_HEADER_LEN + 4 {
            return Err(RouterError::Malformed("icmp packet too short"));
        }
        if !verify_checksum(buf, 2) {
            return Err(RouterError::Malformed("bad icmp checksum"));
        }
        let kind = match (buf[0], buf[1]) {
            (0, 0) => IcmpType::EchoReply,
            (8, 0) => IcmpType::EchoRequest,
            (11, 0) => IcmpType::TimeExceeded,
            (3, code) => IcmpType::DestUnreachable { code },
            _ => return Err(RouterError::Malformed("unhandled icmp type/code")),
        };
        Ok(Self {
            kind,
            rest_of_header: buf[4..8].try_into().unwrap(),
            payload: buf[8..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let (ty, code) = self.wire_type_code();
        let mut buf = vec![0u8; ICMP_HEADER_LEN + 4 + self.payload.len()];
        buf[0] = ty;
        buf[1] = code;
        buf[4..8].copy_from_slice(&self.rest_of_header);
        buf[8..].copy_from_slice(&self.payload);
        let csum = internet_checksum(&buf);
        buf[2..4].copy_from_slice(&csum.to_be_bytes());
        buf
    }

    fn wire_type_code(&self) -> (u8, u8) {
        match self.kind {
            IcmpType::EchoReply => (0, 0),
            IcmpType::EchoRequest => (8, 0),
            IcmpType::TimeExceeded => (11, 0),
            IcmpType::DestUnreachable { code } => (3, code),
        }
    }

    /// Only Echo Request/Reply are eligible "originals" for ICMP-error
    /// suppression: an ICMP error is never sent in reply to another ICMP
    /// error.
    pub fn is_eligible_original(&self) -> bool {
        matches!(self.kind, IcmpType::EchoRequest | IcmpType::EchoReply)
    }

    /// Builds an ICMP error body: the original IP header followed by the
    /// first 8 bytes of its payload; the rest-of-header's leading 4
    /// unused bytes are supplied separately via `rest_of_header`.
    pub fn error_body(original_ip_header: &[u8; IPV4_HEADER_LEN], original_payload_head: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(IPV4_HEADER_LEN + 8);
        body.extend_from_slice(original_ip_header);
        body.extend_from_slice(&original_payload_head[..original_payload_head.len().min(8)]);
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mac(n: u8) -> MacAddress {
        MacAddress::new([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, n])
    }

    #[test]
    fn ethernet_round_trip() {
        let hdr = EthernetHeader { dst: sample_mac(1), src: sample_mac(2), ethertype: ETHERTYPE_IPV4 };
        let mut buf = [0u8; ETH_HEADER_LEN];
        hdr.emit(&mut buf);
        let parsed = EthernetHeader::parse(&buf).unwrap();
        assert_eq!(parsed.dst, hdr.dst);
        assert_eq!(parsed.ethertype, ETHERTYPE_IPV4);
    }

    #[test]
    fn arp_round_trip() {
        let pkt = ArpPacket {
            operation: ArpOperation::Reply,
            sender_mac: sample_mac(1),
            sender_ip: Ipv4Addr::new(10, 0, 0, 1),
            target_mac: sample_mac(2),
            target_ip: Ipv4Addr::new(10, 0, 0, 2),
        };
        let mut buf = [0u8; ARP_PACKET_LEN];
        pkt.emit(&mut buf);
        let parsed = ArpPacket::parse(&buf).unwrap();
        assert_eq!(parsed.sender_ip, pkt.sender_ip);
        assert_eq!(parsed.operation, ArpOperation::Reply);
    }

    #[test]
    fn ipv4_round_trip_and_ttl_decrement() {
        let mut hdr = Ipv4Header {
            tos: 0,
            total_len: 40,
            id: 0x1234,
            ttl: 10,
            protocol: IP_PROTO_ICMP,
            checksum: 0,
            src: Ipv4Addr::new(10, 0, 0, 2),
            dst: Ipv4Addr::new(10, 1, 2, 3),
        };
        let mut buf = [0u8; IPV4_HEADER_LEN];
        hdr.emit(&mut buf);
        assert!(Ipv4Header::parse(&buf).is_ok());
        hdr.decrement_ttl_and_reseal(&mut buf);
        let reparsed = Ipv4Header::parse(&buf).unwrap();
        assert_eq!(reparsed.ttl, 9);
    }

    #[test]
    fn ipv4_rejects_fragments() {
        let mut hdr = Ipv4Header {
            tos: 0,
            total_len: 40,
            id: 1,
            ttl: 64,
            protocol: IP_PROTO_UDP,
            checksum: 0,
            src: Ipv4Addr::new(1, 1, 1, 1),
            dst: Ipv4Addr::new(2, 2, 2, 2),
        };
        let mut buf = [0u8; IPV4_HEADER_LEN];
        hdr.emit(&mut buf);
        buf[6] = 0x20; // MF bit
        assert!(Ipv4Header::parse(&buf).is_err());
    }

    #[test]
    fn icmp_echo_round_trip() {
        let pkt = IcmpPacket { kind: IcmpType::EchoRequest, rest_of_header: [0x12, 0x34, 0, 1], payload: vec![0xAB; 32] };
        let bytes = pkt.to_bytes();
        let parsed = IcmpPacket::parse(&bytes).unwrap();
        assert_eq!(parsed.kind, IcmpType::EchoRequest);
        assert_eq!(parsed.payload, pkt.payload);
    }
}
