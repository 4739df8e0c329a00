//! PWOSPF HELLO/LSU validation, neighbor maintenance, origination and
//! reflooding.

use log::{debug, info, warn};

use crate::core::errors::RouterError;
use crate::core::interface::{Interface, NeighborRecord};
use crate::core::packet::{EthernetHeader, Ipv4Header, ETHERTYPE_IPV4, IP_PROTO_PWOSPF};
use crate::core::pwospf::{
    seal_checksum, Advertisement, HelloTrailer, LsuPacket, PwospfCommonHeader, PWOSPF_ALLSPFROUTERS, PWOSPF_COMMON_HEADER_LEN, PWOSPF_HELLO_TRAILER_LEN,
    PWOSPF_TYPE_HELLO, PWOSPF_TYPE_LSU, PWOSPF_VERSION,
};
use crate::core::state::RouterState;


pub async fn handle_pwospf(state: &RouterState, ingress_ifc: &str, ip_header: &Ipv4Header, payload: &[u8]) -> Result<(), RouterError> {
    let common = PwospfCommonHeader::parse(payload)?;
    if common.area_id != state.area_id {
        debug!("dropping pwospf packet for foreign area {}", common.area_id);
        return Ok(());
    }
    if common.router_id == state.router_id {
        return Ok(()); // our own packet, looped back
    }
    let rest = &payload[PWOSPF_COMMON_HEADER_LEN..];
    match common.packet_type {
        PWOSPF_TYPE_HELLO => handle_hello(state, ingress_ifc, common.router_id, ip_header.src, rest).await,
        PWOSPF_TYPE_LSU => handle_lsu(state, ingress_ifc, common.router_id, common.area_id, rest).await,
        other => {
            warn!("unknown pwospf packet type {other}");
            Ok(())
        }
    }
}

async fn handle_hello(state: &RouterState, ingress_ifc: &str, neighbor_router_id: u32, neighbor_ip: std::net::Ipv4Addr, rest: &[u8]) -> Result<(), RouterError> {
    let trailer = HelloTrailer::parse(rest)?;
    let Some(ifc) = state.interface_by_name(ingress_ifc) else {
        return Err(RouterError::Configuration(format!("unknown interface {ingress_ifc}")));
    };
    if trailer.netmask != ifc.mask {
        debug!("dropping hello with mismatched netmask on {ingress_ifc}");
        return Ok(());
    }
    if trailer.hello_interval != state.hello_interval {
        debug!("dropping hello with mismatched hello_interval on {ingress_ifc}");
        return Ok(());
    }
    let is_new = {
        let mut runtime = ifc.runtime.lock().unwrap();
        if let Some(existing) = runtime.neighbors.iter_mut().find(|n| n.neighbor_router_id == neighbor_router_id) {
            existing.last_hello = chrono::Utc::now();
            false
        } else {
            info!("new pwospf neighbor {neighbor_router_id} on {ingress_ifc}");
            runtime.neighbors.push(NeighborRecord { neighbor_ip, neighbor_router_id, last_hello: chrono::Utc::now() });
            true
        }
    };
    // A new adjacency changes this router's own advertisement set, so
    // Dijkstra must re-run and peers must hear about it promptly rather
    // than waiting for the next periodic LSU.
    if is_new {
        state.dijkstra_dirty.notify_waiters();
        originate_lsu(state).await?;
    }
    Ok(())
}

async fn handle_lsu(state: &RouterState, ingress_ifc: &str, router_id: u32, area_id: u32, rest: &[u8]) -> Result<(), RouterError> {
    let lsu = LsuPacket::parse(rest)?;
    let result = {
        let mut topo = state.topology.lock().await;
        topo.accept_lsu(router_id, area_id, lsu.sequence, chrono::Utc::now(), lsu.advertisements.clone())
    };
    if !result.accepted {
        debug!("dropping lsu from {router_id}, sequence {} not newer", lsu.sequence);
        return Ok(());
    }
    if result.content_changed {
        state.dijkstra_dirty.notify_waiters();
    }
    if lsu.ttl > 1 {
        reflood(state, ingress_ifc, router_id, &lsu).await?;
    }
    Ok(())
}

/// Re-sends an accepted LSU out every interface except the one it
/// arrived on, with TTL decremented.
async fn reflood(state: &RouterState, ingress_ifc: &str, originating_router: u32, lsu: &LsuPacket) -> Result<(), RouterError> {
    let mut out = lsu.clone();
    out.ttl -= 1;
    for ifc in &state.interfaces {
        if ifc.name == ingress_ifc {
            continue;
        }
        send_lsu_on(state, ifc, originating_router, state.area_id, &out).await?;
    }
    Ok(())
}

async fn send_lsu_on(state: &RouterState, ifc: &Interface, router_id: u32, area_id: u32, lsu: &LsuPacket) -> Result<(), RouterError> {
    let mut pwospf_bytes = vec![0u8; PWOSPF_COMMON_HEADER_LEN + lsu.wire_len()];
    PwospfCommonHeader { version: PWOSPF_VERSION, packet_type: PWOSPF_TYPE_LSU, packet_len: pwospf_bytes.len() as u16, router_id, area_id, checksum: 0, autype: 0 }
        .emit(&mut pwospf_bytes[0..PWOSPF_COMMON_HEADER_LEN]);
    lsu.emit(&mut pwospf_bytes[PWOSPF_COMMON_HEADER_LEN..]);
    seal_checksum(&mut pwospf_bytes);

    send_pwospf_frame(state, ifc, pwospf_bytes).await
}

async fn send_pwospf_frame(state: &RouterState, ifc: &Interface, pwospf_bytes: Vec<u8>) -> Result<(), RouterError> {
    let ip_header = Ipv4Header {
        tos: 0,
        total_len: (20 + pwospf_bytes.len()) as u16,
        id: 0,
        ttl: 1,
        protocol: IP_PROTO_PWOSPF,
        checksum: 0,
        src: ifc.ip,
        dst: PWOSPF_ALLSPFROUTERS,
    };
    let mut ip_bytes = vec![0u8; 20];
    ip_header.emit(&mut ip_bytes);

    let eth = EthernetHeader { dst: mac_address::MacAddress::new([0x01, 0x00, 0x5e, 0x00, 0x00, 0x05]), src: ifc.mac, ethertype: ETHERTYPE_IPV4 };
    let mut frame = vec![0u8; 14];
    eth.emit(&mut frame);
    frame.extend_from_slice(&ip_bytes);
    frame.extend_from_slice(&pwospf_bytes);

    // PWOSPF is always link-local multicast: the destination MAC is
    // already fixed above, so this never goes through ARP resolution.
    // It's instead queued for `lsu_broadcaster` to drain, an async
    // condition-variable queue rather than a direct send.
    state.lsu_out.lock().await.push(encode_queued_frame(&ifc.name, &frame));
    state.lsu_notify.notify_one();
    Ok(())
}

/// `lsu_out` holds raw bytes ready to send; the egress interface name is
/// length-prefixed onto the front so the broadcaster can recover it
/// without a second, differently-shaped queue.
fn encode_queued_frame(ifc_name: &str, frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + ifc_name.len() + frame.len());
    out.push(ifc_name.len() as u8);
    out.extend_from_slice(ifc_name.as_bytes());
    out.extend_from_slice(frame);
    out
}

pub fn decode_queued_frame(entry: &[u8]) -> (&str, &[u8]) {
    let name_len = entry[0] as usize;
    let name = std::str::from_utf8(&entry[1..1 + name_len]).unwrap_or("");
    (name, &entry[1 + name_len..])
}

/// Sends one HELLO out `ifc_name` as part of periodic origination.
pub async fn originate_hello(state: &RouterState, ifc_name: &str) -> Result<(), RouterError> {
    let Some(ifc) = state.interface_by_name(ifc_name) else {
        return Err(RouterError::Configuration(format!("unknown interface {ifc_name}")));
    };
    let mut buf = vec![0u8; PWOSPF_COMMON_HEADER_LEN + PWOSPF_HELLO_TRAILER_LEN];
    PwospfCommonHeader {
        version: PWOSPF_VERSION,
        packet_type: PWOSPF_TYPE_HELLO,
        packet_len: buf.len() as u16,
        router_id: state.router_id,
        area_id: state.area_id,
        checksum: 0,
        autype: 0,
    }
    .emit(&mut buf[0..PWOSPF_COMMON_HEADER_LEN]);
    HelloTrailer { netmask: ifc.mask, hello_interval: state.hello_interval }.emit(&mut buf[PWOSPF_COMMON_HEADER_LEN..]);
    seal_checksum(&mut buf);

    ifc.runtime.lock().unwrap().last_hello_sent = Some(chrono::Utc::now());
    send_pwospf_frame(state, ifc, buf).await
}

/// Builds this router's own advertisement set from its interfaces'
/// active neighbors and floods a freshly-sequenced LSU.
pub async fn originate_lsu(state: &RouterState) -> Result<(), RouterError> {
    let advertisements = crate::core::dijkstra::self_advertisements(&state.interfaces);
    let lsu = LsuPacket { sequence: state.next_lsu_sequence(), ttl: 16, advertisements };
    for ifc in &state.interfaces {
        send_lsu_on(state, ifc, state.router_id, state.area_id, &lsu).await?;
    }
    Ok(())
}

/// Drops neighbors that have missed `3 * hello_interval`; returns
/// `true` if any adjacency disappeared, so the caller can trigger a
/// fresh LSU origination and a Dijkstra re-run.
pub fn expire_neighbors(state: &RouterState) -> bool {
    let now = chrono::Utc::now();
    let mut any_expired = false;
    for ifc in &state.interfaces {
        let mut runtime = ifc.runtime.lock().unwrap();
        let before = runtime.neighbors.len();
        runtime.neighbors.retain(|n| !n.is_expired(now, state.hello_interval));
        if runtime.neighbors.len() != before {
            any_expired = true;
        }
    }
    any_expired
}

pub fn is_pwospf(protocol: u8) -> bool {
    protocol == IP_PROTO_PWOSPF
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interface::Port;
    use crate::core::state::RouterState;
    use crate::netio::loopback::LoopbackRegisters;
    use mac_address::MacAddress;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    fn state_with_one_interface(hello_interval: u16) -> std::sync::Arc<RouterState> {
        let ifc = Interface::new(Port::Eth0, "eth0", Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), MacAddress::new([0xaa; 6]), 1000);
        let mut egress: HashMap<String, tokio::sync::Mutex<Box<dyn crate::netio::PortEgress>>> = HashMap::new();
        egress.insert("eth0".into(), tokio::sync::Mutex::new(Box::new(crate::netio::loopback::LoopbackEgress::new())));
        std::sync::Arc::new(RouterState::new(1, 0, hello_interval, vec![ifc], egress, Box::new(LoopbackRegisters::new())))
    }

    fn hello_trailer_bytes(netmask: Ipv4Addr, hello_interval: u16) -> Vec<u8> {
        let mut buf = vec![0u8; PWOSPF_HELLO_TRAILER_LEN];
        HelloTrailer { netmask, hello_interval }.emit(&mut buf);
        buf
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mismatched_hello_interval_is_dropped_without_creating_a_neighbor() {
        let state = state_with_one_interface(10);
        let rest = hello_trailer_bytes(Ipv4Addr::new(255, 255, 255, 0), 30);

        handle_hello(&state, "eth0", 2, Ipv4Addr::new(10, 0, 0, 2), &rest).await.unwrap();

        let ifc = state.interface_by_name("eth0").unwrap();
        assert!(ifc.runtime.lock().unwrap().neighbors.is_empty(), "a hello_interval mismatch must not create a neighbor");
        assert!(state.lsu_out.lock().await.is_empty(), "a dropped hello must not trigger an lsu flood");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn new_neighbor_triggers_an_lsu_flood_but_a_refresh_does_not() {
        let state = state_with_one_interface(10);
        let rest = hello_trailer_bytes(Ipv4Addr::new(255, 255, 255, 0), 10);

        handle_hello(&state, "eth0", 2, Ipv4Addr::new(10, 0, 0, 2), &rest).await.unwrap();
        {
            let ifc = state.interface_by_name("eth0").unwrap();
            assert_eq!(ifc.runtime.lock().unwrap().neighbors.len(), 1);
        }
        let flooded_after_discovery = state.lsu_out.lock().await.len();
        assert!(flooded_after_discovery > 0, "discovering a new neighbor must originate an lsu flood");

        state.lsu_out.lock().await.clear();
        handle_hello(&state, "eth0", 2, Ipv4Addr::new(10, 0, 0, 2), &rest).await.unwrap();
        assert!(state.lsu_out.lock().await.is_empty(), "refreshing an already-known neighbor must not reflood");
    }
}
