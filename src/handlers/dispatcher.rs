//! Per-port ingress loop and EtherType classification.
//!
//! One `tokio::spawn` per configured port reads frames and classifies
//! them; the dispatcher itself never touches `RouterState`'s locks
//! directly, it only hands parsed packets to the handler that owns
//! them — one task per flow, generalized from a single socket to N
//! ports.

use std::sync::Arc;

use log::{trace, warn};

use crate::core::errors::RouterError;
use crate::core::packet::{ArpPacket, EthernetHeader, Ipv4Header};
use crate::core::state::RouterState;
use crate::netio::PortIngress;

use super::{arp_handler, ip_handler};

pub struct Dispatcher {
    pub state: Arc<RouterState>,
}

impl Dispatcher {
    pub fn new(state: Arc<RouterState>) -> Self {
        Self { state }
    }

    /// Spawns one read loop per `(interface name, ingress port)` pair.
    pub fn spawn_all(&self, ports: Vec<(String, Box<dyn PortIngress>)>) -> Vec<tokio::task::JoinHandle<()>> {
        ports
            .into_iter()
            .map(|(name, port)| {
                let state = self.state.clone();
                tokio::spawn(async move { read_loop(state, name, port).await })
            })
            .collect()
    }
}

async fn read_loop(state: Arc<RouterState>, ifc_name: String, port: Box<dyn PortIngress>) {
    loop {
        if state.is_stopping() {
            return;
        }
        match port.recv_frame().await {
            Ok(frame) => {
                if let Err(e) = handle_frame(&state, &ifc_name, &frame).await {
                    warn!("error handling frame on {ifc_name}: {e}");
                }
            }
            Err(e) => {
                warn!("ingress error on {ifc_name}: {e}");
                return;
            }
        }
    }
}

async fn handle_frame(state: &RouterState, ifc_name: &str, frame: &[u8]) -> Result<(), RouterError> {
    // Correlates this frame's log lines across handler calls; never
    // persisted or compared, only printed, so `new_v4` is fine here.
    let trace_id = uuid::Uuid::new_v4();
    let eth = EthernetHeader::parse(frame)?;
    let payload = &frame[14..];
    trace!("[{trace_id}] frame on {ifc_name}: ethertype={:#06x}", eth.ethertype);

    if arp_handler::is_arp(eth.ethertype) {
        let arp = ArpPacket::parse(payload)?;
        return arp_handler::handle_arp(state, ifc_name, &eth, arp).await;
    }
    if ip_handler::is_ipv4(eth.ethertype) {
        let header = Ipv4Header::parse(payload)?;
        let ip_payload = &payload[20..];
        return ip_handler::handle_ipv4(state, ifc_name, &eth, header, ip_payload).await;
    }
    Ok(()) // unrecognized ethertype, silently dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interface::Port;
    use crate::netio::loopback::{LoopbackEgress, LoopbackIngress};
    use mac_address::MacAddress;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    #[tokio::test(flavor = "multi_thread")]
    async fn arp_request_for_our_ip_gets_a_reply() {
        let ifc = crate::core::interface::Interface::new(
            Port::Eth0,
            "eth0",
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 0),
            MacAddress::new([0xaa; 6]),
            1000,
        );
        let mut egress: HashMap<String, tokio::sync::Mutex<Box<dyn crate::netio::PortEgress>>> = HashMap::new();
        let egress_port = LoopbackEgress::new();
        egress.insert("eth0".into(), tokio::sync::Mutex::new(Box::new(egress_port)));
        let state = Arc::new(RouterState::new(
            1,
            0,
            10,
            vec![ifc],
            egress,
            Box::new(crate::netio::loopback::LoopbackRegisters::new()),
        ));

        let (tx, ingress) = LoopbackIngress::new();
        let request = ArpPacket {
            operation: crate::core::packet::ArpOperation::Request,
            sender_mac: MacAddress::new([0xbb; 6]),
            sender_ip: Ipv4Addr::new(10, 0, 0, 2),
            target_mac: MacAddress::new([0; 6]),
            target_ip: Ipv4Addr::new(10, 0, 0, 1),
        };
        let frame = request.build_frame(MacAddress::new([0xbb; 6]));
        tx.send(frame).unwrap();
        drop(tx);

        let dispatcher = Dispatcher::new(state.clone());
        let handles = dispatcher.spawn_all(vec![("eth0".to_string(), Box::new(ingress))]);
        for h in handles {
            let _ = h.await;
        }

        let cache = state.arp_cache.read().await;
        assert_eq!(cache.lookup(Ipv4Addr::new(10, 0, 0, 2)), Some(MacAddress::new([0xbb; 6])));
    }
}
