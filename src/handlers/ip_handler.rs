//! IPv4 forwarding decision tree and ICMP error generation.

use std::net::Ipv4Addr;

use log::{debug, warn};

use crate::core::errors::RouterError;
use crate::core::packet::{
    EthernetHeader, IcmpPacket, IcmpType, Ipv4Header, ETHERTYPE_IPV4, ICMP_CODE_HOST_UNREACHABLE, ICMP_CODE_NET_UNKNOWN, ICMP_CODE_NET_UNREACHABLE,
    ICMP_CODE_PROTOCOL_UNREACHABLE, IP_PROTO_ICMP, IP_PROTO_PWOSPF,
};
use crate::core::pwospf::PWOSPF_ALLSPFROUTERS;
use crate::core::state::RouterState;

use super::arp_handler::resolve_and_send;
use super::pwospf_handler;

pub async fn handle_ipv4(state: &RouterState, ingress_ifc: &str, eth: &EthernetHeader, mut header: Ipv4Header, payload: &[u8]) -> Result<(), RouterError> {
    let _ = eth;
    if let Some(ifc) = state.interfaces.iter().find(|i| i.ip == header.dst) {
        return handle_local(state, ifc, &header, payload).await;
    }
    if header.dst == PWOSPF_ALLSPFROUTERS {
        let Some(ifc) = state.interface_by_name(ingress_ifc) else {
            return Err(RouterError::Configuration(format!("unknown interface {ingress_ifc}")));
        };
        return handle_local(state, ifc, &header, payload).await;
    }

    let route = {
        let rtable = state.rtable.read().await;
        rtable.lookup(header.dst).cloned()
    };
    let Some(route) = route else {
        warn!("no route to {}", header.dst);
        return reply_icmp_error(state, &header, payload, IcmpType::DestUnreachable { code: ICMP_CODE_NET_UNKNOWN }).await;
    };

    if route.egress_ifc == ingress_ifc {
        debug!("dropping packet to {}, egress equals ingress on {}", header.dst, ingress_ifc);
        return reply_icmp_error(state, &header, payload, IcmpType::DestUnreachable { code: ICMP_CODE_NET_UNREACHABLE }).await;
    }

    if header.ttl <= 1 {
        debug!("ttl expired forwarding to {}", header.dst);
        return reply_icmp_error(state, &header, payload, IcmpType::TimeExceeded).await;
    }

    let mut frame_bytes = Vec::with_capacity(14 + 20 + payload.len());
    frame_bytes.extend_from_slice(&[0; 14]); // eth header patched in by resolve_and_send
    let mut ip_bytes = vec![0u8; 20];
    header.emit(&mut ip_bytes);
    header.decrement_ttl_and_reseal(&mut ip_bytes);
    frame_bytes.extend_from_slice(&ip_bytes);
    frame_bytes.extend_from_slice(payload);
    // stamp src mac and ethertype for the egress interface now
    if let Some(out_ifc) = state.interface_by_name(&route.egress_ifc) {
        frame_bytes[6..12].copy_from_slice(&out_ifc.mac.bytes());
    }
    frame_bytes[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

    let next_hop = route.next_hop(header.dst);
    resolve_and_send(state, &route.egress_ifc, next_hop, header.src, frame_bytes).await
}

async fn handle_local(state: &RouterState, ifc: &crate::core::interface::Interface, header: &Ipv4Header, payload: &[u8]) -> Result<(), RouterError> {
    match header.protocol {
        IP_PROTO_ICMP => handle_icmp(state, ifc, header, payload).await,
        IP_PROTO_PWOSPF => pwospf_handler::handle_pwospf(state, &ifc.name, header, payload).await,
        other => {
            debug!("dropping locally-destined protocol {other}, unreachable");
            reply_icmp_error(state, header, payload, IcmpType::DestUnreachable { code: ICMP_CODE_PROTOCOL_UNREACHABLE }).await
        }
    }
}

async fn handle_icmp(state: &RouterState, ifc: &crate::core::interface::Interface, header: &Ipv4Header, payload: &[u8]) -> Result<(), RouterError> {
    let icmp = IcmpPacket::parse(payload)?;
    if !matches!(icmp.kind, IcmpType::EchoRequest) {
        debug!("ignoring non-echo icmp locally");
        return Ok(());
    }
    let reply = IcmpPacket { kind: IcmpType::EchoReply, rest_of_header: icmp.rest_of_header, payload: icmp.payload.clone() };
    send_icmp(state, ifc, header.src, &reply).await
}

/// Never originate an ICMP error in response to another ICMP error
/// (only echo request/reply are "eligible" originals for error replies).
async fn reply_icmp_error(state: &RouterState, original: &Ipv4Header, original_payload: &[u8], kind: IcmpType) -> Result<(), RouterError> {
    if original.protocol == IP_PROTO_ICMP {
        if let Ok(inner) = IcmpPacket::parse(original_payload) {
            if !inner.is_eligible_original() {
                return Ok(());
            }
        }
    }
    let mut original_header_bytes = [0u8; 20];
    original.emit(&mut original_header_bytes);
    let body = IcmpPacket::error_body(&original_header_bytes, original_payload);
    let icmp = IcmpPacket { kind, rest_of_header: [0; 4], payload: body };

    let out_ifc = state
        .interfaces
        .iter()
        .find(|i| i.matches_subnet(original.src))
        .or_else(|| state.interfaces.first());
    let Some(ifc) = out_ifc else { return Err(RouterError::Configuration("no interface available for icmp error".into())) };
    send_icmp(state, ifc, original.src, &icmp).await
}

async fn send_icmp(state: &RouterState, ifc: &crate::core::interface::Interface, dst: Ipv4Addr, icmp: &IcmpPacket) -> Result<(), RouterError> {
    let payload = icmp.to_bytes();
    let ip_header = Ipv4Header {
        tos: 0,
        total_len: (20 + payload.len()) as u16,
        id: 0,
        ttl: 64,
        protocol: IP_PROTO_ICMP,
        checksum: 0,
        src: ifc.ip,
        dst,
    };
    let mut ip_bytes = vec![0u8; 20];
    ip_header.emit(&mut ip_bytes);

    let mut frame = vec![0u8; 14];
    frame[6..12].copy_from_slice(&ifc.mac.bytes());
    frame[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    frame.extend_from_slice(&ip_bytes);
    frame.extend_from_slice(&payload);

    resolve_and_send(state, &ifc.name, dst, ifc.ip, frame).await
}

pub fn is_ipv4(ethertype: u16) -> bool {
    ethertype == ETHERTYPE_IPV4
}

/// Emitted when ARP resolution for a frame's next hop exhausts its
/// retry budget; `original` is the IPv4 header of the frame that
/// could never be delivered.
pub async fn reply_icmp_host_unreachable(state: &RouterState, original: Ipv4Header, original_payload: &[u8]) -> Result<(), RouterError> {
    reply_icmp_error(state, &original, original_payload, IcmpType::DestUnreachable { code: ICMP_CODE_HOST_UNREACHABLE }).await
}
