//! ARP resolution, request/reply handling, and the HW-mirror refresh
//! they trigger.

use std::net::Ipv4Addr;

use chrono::Utc;
use log::{debug, info, warn};
use mac_address::MacAddress;

use crate::core::arp_table::PendingFrame;
use crate::core::errors::RouterError;
use crate::core::packet::{ArpOperation, ArpPacket, EthernetHeader, ETHERTYPE_ARP};
use crate::core::state::RouterState;
use crate::hwsync;

/// Sends `frame` to `next_hop`, resolving its MAC first if needed. If
/// resolution is already pending, the frame is appended to that queue
/// entry and this call returns without sending anything.
pub async fn resolve_and_send(state: &RouterState, egress_ifc: &str, next_hop: Ipv4Addr, original_src: Ipv4Addr, frame: Vec<u8>) -> Result<(), RouterError> {
    if let Some(mac) = state.arp_cache.read().await.lookup(next_hop) {
        return send_on(state, egress_ifc, &patch_dst_mac(frame, mac)).await;
    }

    let created = {
        let mut queue = state.arp_queue.write().await;
        queue.enqueue(next_hop, egress_ifc, Utc::now(), PendingFrame { bytes: frame, original_src })
    };
    if created {
        send_arp_request(state, egress_ifc, next_hop).await?;
    }
    Ok(())
}

fn patch_dst_mac(mut frame: Vec<u8>, mac: MacAddress) -> Vec<u8> {
    if frame.len() >= 6 {
        frame[0..6].copy_from_slice(&mac.bytes());
    }
    frame
}

async fn send_on(state: &RouterState, ifc_name: &str, frame: &[u8]) -> Result<(), RouterError> {
    let egress = state
        .egress
        .get(ifc_name)
        .ok_or_else(|| RouterError::Configuration(format!("no egress port for {ifc_name}")))?;
    egress.lock().await.send_frame(frame).await
}

pub async fn send_arp_request(state: &RouterState, egress_ifc: &str, target_ip: Ipv4Addr) -> Result<(), RouterError> {
    let ifc = state
        .interface_by_name(egress_ifc)
        .ok_or_else(|| RouterError::Configuration(format!("unknown interface {egress_ifc}")))?;
    let req = ArpPacket {
        operation: ArpOperation::Request,
        sender_mac: ifc.mac,
        sender_ip: ifc.ip,
        target_mac: MacAddress::new([0; 6]),
        target_ip,
    };
    let frame = req.build_frame(ifc.mac);
    debug!("sending arp request for {target_ip} on {egress_ifc}");
    send_on(state, egress_ifc, &frame).await
}

/// Dispatches a parsed ARP payload arriving on `ingress_ifc`.
pub async fn handle_arp(state: &RouterState, ingress_ifc: &str, eth: &EthernetHeader, arp: ArpPacket) -> Result<(), RouterError> {
    match arp.operation {
        ArpOperation::Request => handle_request(state, ingress_ifc, arp).await,
        ArpOperation::Reply => handle_reply(state, arp).await,
    }?;
    let _ = eth;
    Ok(())
}

async fn handle_request(state: &RouterState, ingress_ifc: &str, arp: ArpPacket) -> Result<(), RouterError> {
    let ifc = state
        .interface_by_name(ingress_ifc)
        .ok_or_else(|| RouterError::Configuration(format!("unknown interface {ingress_ifc}")))?;
    if arp.target_ip != ifc.ip {
        return Ok(()); // not addressed to us; nothing to answer
    }
    let reply = ArpPacket {
        operation: ArpOperation::Reply,
        sender_mac: ifc.mac,
        sender_ip: ifc.ip,
        target_mac: arp.sender_mac,
        target_ip: arp.sender_ip,
    };
    let frame = reply.build_frame(ifc.mac);
    send_on(state, ingress_ifc, &frame).await?;
    learn(state, arp.sender_ip, arp.sender_mac).await
}

async fn handle_reply(state: &RouterState, arp: ArpPacket) -> Result<(), RouterError> {
    learn(state, arp.sender_ip, arp.sender_mac).await?;
    flush_pending(state, arp.sender_ip).await
}

async fn learn(state: &RouterState, ip: Ipv4Addr, mac: MacAddress) -> Result<(), RouterError> {
    {
        let mut cache = state.arp_cache.write().await;
        cache.upsert(ip, mac, Utc::now(), false);
    }
    let cache = state.arp_cache.read().await;
    hwsync::sync_arp_cache(state, &cache).await
}

/// Sends every frame buffered for `resolved_ip` now that it has a MAC,
/// and retires the queue entry.
async fn flush_pending(state: &RouterState, resolved_ip: Ipv4Addr) -> Result<(), RouterError> {
    let entry = {
        let mut queue = state.arp_queue.write().await;
        queue.remove(resolved_ip)
    };
    let Some(entry) = entry else { return Ok(()) };
    let mac = state.arp_cache.read().await.lookup(resolved_ip);
    let Some(mac) = mac else { return Ok(()) };
    info!("arp resolved {resolved_ip}, flushing {} queued frame(s)", entry.pending.len());
    for pending in entry.pending {
        send_on(state, &entry.egress_ifc, &patch_dst_mac(pending.bytes, mac)).await?;
    }
    Ok(())
}

/// Retries outstanding resolutions at 1 Hz, giving up (and returning the
/// abandoned entries so the caller can emit ICMP Host Unreachable) after
/// the request cap.
pub async fn retry_pending_resolutions(state: &RouterState) -> Vec<(Ipv4Addr, Vec<PendingFrame>)> {
    let mut abandoned = Vec::new();
    let now = Utc::now();
    let mut to_request = Vec::new();
    {
        let mut queue = state.arp_queue.write().await;
        for timed_out in queue.drain_expired_requests(now) {
            abandoned.push((timed_out.0, timed_out.1.pending));
        }
        for (ip, entry) in queue.iter_mut() {
            if (now - entry.last_request).num_seconds() > crate::core::arp_table::ARP_REQUEST_INTERVAL_SECONDS {
                entry.request_count += 1;
                entry.last_request = now;
                to_request.push((ip, entry.egress_ifc.clone()));
            }
        }
    }
    for (ip, ifc) in to_request {
        if let Err(e) = send_arp_request(state, &ifc, ip).await {
            warn!("failed to re-send arp request for {ip}: {e}");
        }
    }
    abandoned
}

pub fn is_arp(ethertype: u16) -> bool {
    ethertype == ETHERTYPE_ARP
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arp_table::ARP_REQUEST_INTERVAL_SECONDS;
    use crate::core::interface::{Interface, Port};
    use crate::core::state::RouterState;
    use crate::netio::loopback::LoopbackRegisters;
    use std::collections::HashMap;

    fn state_with_one_interface() -> std::sync::Arc<RouterState> {
        let ifc = Interface::new(Port::Eth0, "eth0", Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(255, 255, 255, 0), MacAddress::new([0xaa; 6]), 1000);
        let mut egress: HashMap<String, tokio::sync::Mutex<Box<dyn crate::netio::PortEgress>>> = HashMap::new();
        egress.insert("eth0".into(), tokio::sync::Mutex::new(Box::new(crate::netio::loopback::LoopbackEgress::new())));
        std::sync::Arc::new(RouterState::new(1, 0, 10, vec![ifc], egress, Box::new(LoopbackRegisters::new())))
    }

    async fn seeded_age(state: &RouterState, next_hop: Ipv4Addr, age_secs: i64) {
        let mut queue = state.arp_queue.write().await;
        let last_request = Utc::now() - chrono::Duration::seconds(age_secs);
        queue.enqueue(next_hop, "eth0", last_request, PendingFrame { bytes: vec![0; 6], original_src: Ipv4Addr::new(10, 0, 0, 1) });
        for (_, e) in queue.iter_mut() {
            e.last_request = last_request;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_boundary_is_exclusive() {
        let state = state_with_one_interface();
        let next_hop = Ipv4Addr::new(10, 0, 0, 9);
        seeded_age(&state, next_hop, ARP_REQUEST_INTERVAL_SECONDS).await;

        retry_pending_resolutions(&state).await;

        let mut queue = state.arp_queue.write().await;
        let (_, entry) = queue.iter_mut().next().expect("entry must still be queued");
        assert_eq!(entry.request_count, 1, "exactly at the interval boundary must not retry yet");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retry_fires_once_past_the_boundary() {
        let state = state_with_one_interface();
        let next_hop = Ipv4Addr::new(10, 0, 0, 9);
        seeded_age(&state, next_hop, ARP_REQUEST_INTERVAL_SECONDS + 1).await;

        retry_pending_resolutions(&state).await;

        let mut queue = state.arp_queue.write().await;
        let (_, entry) = queue.iter_mut().next().expect("entry must still be queued");
        assert_eq!(entry.request_count, 2, "past the interval, a retry must be sent");
    }
}
