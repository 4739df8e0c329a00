//! PWOSPF common header, HELLO trailer, LSU header, and advertisement
//! list codecs: 24-byte common header + 8-byte HELLO trailer, or 24-byte
//! common header + 8-byte LSU header + N*12-byte advertisements.
//!
//! The advertisement list is a flat, variable-count array of
//! fixed-shape records glued onto a fixed header — a "count then flat
//! array of records" shape, same as the option codecs elsewhere in this
//! crate.

use std::net::Ipv4Addr;

use super::checksum::{internet_checksum_excluding, verify_checksum};
use super::errors::RouterError;

pub const PWOSPF_VERSION: u8 = 2;
pub const PWOSPF_TYPE_HELLO: u8 = 1;
pub const PWOSPF_TYPE_LSU: u8 = 4;
pub const PWOSPF_COMMON_HEADER_LEN: usize = 24;
pub const PWOSPF_HELLO_TRAILER_LEN: usize = 8;
pub const PWOSPF_LSU_HEADER_LEN: usize = 8;
pub const PWOSPF_ADVERTISEMENT_LEN: usize = 12;
pub const PWOSPF_AUTH_OFFSET: usize = 16;
pub const PWOSPF_AUTH_LEN: usize = 8;
pub const PWOSPF_ALLSPFROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);

#[derive(Debug, Clone, Copy)]
pub struct PwospfCommonHeader {
    pub version: u8,
    pub packet_type: u8,
    pub packet_len: u16,
    pub router_id: u32,
    pub area_id: u32,
    pub checksum: u16,
    pub autype: u16,
}

impl PwospfCommonHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < PWOSPF_COMMON_HEADER_LEN {
            return Err(RouterError::Malformed("pwospf header too short"));
        }
        if buf[0] != PWOSPF_VERSION {
            return Err(RouterError::Malformed("bad pwospf version"));
        }
        let autype = u16::from_be_bytes([buf[14], buf[15]]);
        if autype != 0 {
            return Err(RouterError::Malformed("pwospf authentication unsupported"));
        }
        if !verify_checksum_excluding_auth(buf) {
            return Err(RouterError::Malformed("bad pwospf checksum"));
        }
        Ok(Self {
            version: buf[0],
            packet_type: buf[1],
            packet_len: u16::from_be_bytes([buf[2], buf[3]]),
            router_id: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            area_id: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            checksum: u16::from_be_bytes([buf[12], buf[13]]),
            autype,
        })
    }

    pub fn emit(&self, buf: &mut [u8]) {
        buf[0] = self.version;
        buf[1] = self.packet_type;
        buf[2..4].copy_from_slice(&self.packet_len.to_be_bytes());
        buf[4..8].copy_from_slice(&self.router_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.area_id.to_be_bytes());
        buf[12..14].copy_from_slice(&[0, 0]);
        buf[14..16].copy_from_slice(&self.autype.to_be_bytes());
        buf[16..24].fill(0);
    }
}

fn verify_checksum_excluding_auth(buf: &[u8]) -> bool {
    let mut scratch = buf.to_vec();
    let stated = u16::from_be_bytes([buf[12], buf[13]]);
    scratch[12..14].fill(0);
    let computed = internet_checksum_excluding(&scratch, PWOSPF_AUTH_OFFSET, PWOSPF_AUTH_LEN);
    computed == stated
}

/// Finalizes the checksum of a full PWOSPF packet (common header +
/// trailer/advertisements) already written into `buf`.
pub fn seal_checksum(buf: &mut [u8]) {
    buf[12..14].fill(0);
    let csum = internet_checksum_excluding(buf, PWOSPF_AUTH_OFFSET, PWOSPF_AUTH_LEN);
    buf[12..14].copy_from_slice(&csum.to_be_bytes());
}

#[derive(Debug, Clone, Copy)]
pub struct HelloTrailer {
    pub netmask: Ipv4Addr,
    pub hello_interval: u16,
}

impl HelloTrailer {
    pub fn parse(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < PWOSPF_HELLO_TRAILER_LEN {
            return Err(RouterError::Malformed("hello trailer too short"));
        }
        Ok(Self {
            netmask: Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]),
            hello_interval: u16::from_be_bytes([buf[4], buf[5]]),
        })
    }

    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.netmask.octets());
        buf[4..6].copy_from_slice(&self.hello_interval.to_be_bytes());
        buf[6..8].copy_from_slice(&[0, 0]);
    }
}

/// A `{subnet, mask, neighbor router-id}` triple carried inside an LSU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertisement {
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub neighbor_router_id: u32,
}

impl Advertisement {
    pub fn parse(buf: &[u8]) -> Self {
        Self {
            subnet: Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]),
            mask: Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]),
            neighbor_router_id: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
        }
    }

    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.subnet.octets());
        buf[4..8].copy_from_slice(&self.mask.octets());
        buf[8..12].copy_from_slice(&self.neighbor_router_id.to_be_bytes());
    }

    /// Equality used for the LSU merge: `(subnet & mask, mask, router-id)`.
    pub fn merge_key(&self) -> (Ipv4Addr, Ipv4Addr, u32) {
        let masked = u32::from(self.subnet) & u32::from(self.mask);
        (Ipv4Addr::from(masked), self.mask, self.neighbor_router_id)
    }
}

#[derive(Debug, Clone)]
pub struct LsuPacket {
    pub sequence: u16,
    pub ttl: u8,
    pub advertisements: Vec<Advertisement>,
}

impl LsuPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < PWOSPF_LSU_HEADER_LEN {
            return Err(RouterError::Malformed("lsu header too short"));
        }
        let sequence = u16::from_be_bytes([buf[0], buf[1]]);
        let ttl = buf[2];
        let count = u32::from_be_bytes(buf[4..8].try_into().unwrap()) as usize;
        let rest = &buf[PWOSPF_LSU_HEADER_LEN..];
        if rest.len() < count * PWOSPF_ADVERTISEMENT_LEN {
            return Err(RouterError::Malformed("lsu advertisement count mismatch"));
        }
        let advertisements = rest
            .chunks_exact(PWOSPF_ADVERTISEMENT_LEN)
            .take(count)
            .map(Advertisement::parse)
            .collect();
        Ok(Self { sequence, ttl, advertisements })
    }

    pub fn wire_len(&self) -> usize {
        PWOSPF_LSU_HEADER_LEN + self.advertisements.len() * PWOSPF_ADVERTISEMENT_LEN
    }

    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.sequence.to_be_bytes());
        buf[2] = self.ttl;
        buf[3] = 0;
        buf[4..8].copy_from_slice(&(self.advertisements.len() as u32).to_be_bytes());
        for (i, adv) in self.advertisements.iter().enumerate() {
            let start = PWOSPF_LSU_HEADER_LEN + i * PWOSPF_ADVERTISEMENT_LEN;
            adv.emit(&mut buf[start..start + PWOSPF_ADVERTISEMENT_LEN]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_hello(router_id: u32, area_id: u32, netmask: Ipv4Addr, hello_interval: u16) -> Vec<u8> {
        let mut buf = vec![0u8; PWOSPF_COMMON_HEADER_LEN + PWOSPF_HELLO_TRAILER_LEN];
        PwospfCommonHeader {
            version: PWOSPF_VERSION,
            packet_type: PWOSPF_TYPE_HELLO,
            packet_len: buf.len() as u16,
            router_id,
            area_id,
            checksum: 0,
            autype: 0,
        }
        .emit(&mut buf[0..PWOSPF_COMMON_HEADER_LEN]);
        HelloTrailer { netmask, hello_interval }.emit(&mut buf[PWOSPF_COMMON_HEADER_LEN..]);
        seal_checksum(&mut buf);
        buf
    }

    #[test]
    fn hello_round_trips_and_validates() {
        let buf = build_hello(7, 1, Ipv4Addr::new(255, 255, 255, 0), 10);
        let hdr = PwospfCommonHeader::parse(&buf).unwrap();
        assert_eq!(hdr.router_id, 7);
        let trailer = HelloTrailer::parse(&buf[PWOSPF_COMMON_HEADER_LEN..]).unwrap();
        assert_eq!(trailer.hello_interval, 10);
    }

    #[test]
    fn lsu_round_trips_with_advertisements() {
        let advs = vec![
            Advertisement { subnet: Ipv4Addr::new(10, 0, 0, 0), mask: Ipv4Addr::new(255, 255, 255, 0), neighbor_router_id: 2 },
            Advertisement { subnet: Ipv4Addr::new(10, 0, 1, 0), mask: Ipv4Addr::new(255, 255, 255, 0), neighbor_router_id: 0 },
        ];
        let lsu = LsuPacket { sequence: 7, ttl: 3, advertisements: advs.clone() };
        let mut buf = vec![0u8; lsu.wire_len()];
        lsu.emit(&mut buf);
        let parsed = LsuPacket::parse(&buf).unwrap();
        assert_eq!(parsed.sequence, 7);
        assert_eq!(parsed.advertisements, advs);
    }

    #[test]
    fn checksum_excludes_auth_field() {
        let mut buf = build_hello(1, 1, Ipv4Addr::new(255, 255, 255, 0), 10);
        // Mutating the (unused) auth bytes must not invalidate the checksum.
        buf[16] = 0xff;
        assert!(PwospfCommonHeader::parse(&buf).is_ok());
    }

    #[test]
    fn merge_key_ignores_host_bits() {
        let a = Advertisement { subnet: Ipv4Addr::new(10, 0, 0, 5), mask: Ipv4Addr::new(255, 255, 255, 0), neighbor_router_id: 9 };
        let b = Advertisement { subnet: Ipv4Addr::new(10, 0, 0, 200), mask: Ipv4Addr::new(255, 255, 255, 0), neighbor_router_id: 9 };
        assert_eq!(a.merge_key(), b.merge_key());
    }
}
