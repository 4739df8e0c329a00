//! Writes the software ARP cache and routing table to the hardware
//! mirror. Fixed-depth tables: rows beyond the
//! hardware's row count are simply not written, and every unused row
//! below the written count is zeroed so stale entries can't survive a
//! shrink.

use log::{error, info};

use crate::core::arp_table::ArpCache;
use crate::core::interface::Port;
use crate::core::rtable::RoutingTable;
use crate::core::state::RouterState;
use crate::netio::HwRegisterIo;

pub const ARP_TABLE_DEPTH: usize = 32;
pub const ROUTE_TABLE_DEPTH: usize = 32;
const ARP_ROW_WORDS: u32 = 3; // ip, mac-hi, mac-lo
const ROUTE_ROW_WORDS: u32 = 4; // dest, mask, gateway, port-bitmask
const ARP_BASE_OFFSET: u32 = 0x1000;
const ROUTE_BASE_OFFSET: u32 = 0x2000;

/// Mirrors the in-memory ARP cache onto the hardware register file.
/// A write failure is fatal to the calling task: it surfaces as
/// `RouterError::Hardware` and the caller is expected to log and exit.
pub async fn sync_arp_cache(state: &RouterState, cache: &ArpCache) -> Result<(), crate::core::errors::RouterError> {
    let rows = cache.hw_rows();
    if rows.len() > ARP_TABLE_DEPTH {
        error!("arp cache has {} entries, hardware depth is {ARP_TABLE_DEPTH}; truncating", rows.len());
    }
    for i in 0..ARP_TABLE_DEPTH {
        let base = ARP_BASE_OFFSET + (i as u32) * ARP_ROW_WORDS;
        match rows.get(i) {
            Some(entry) => {
                let mac_bytes = entry.mac.bytes();
                state.hw.write_word(base, u32::from(entry.ip)).await?;
                state.hw.write_word(base + 1, u32::from_be_bytes([0, 0, mac_bytes[0], mac_bytes[1]])).await?;
                state.hw.write_word(base + 2, u32::from_be_bytes([mac_bytes[2], mac_bytes[3], mac_bytes[4], mac_bytes[5]])).await?;
            }
            None => {
                state.hw.write_word(base, 0).await?;
                state.hw.write_word(base + 1, 0).await?;
                state.hw.write_word(base + 2, 0).await?;
            }
        }
    }
    info!("synced {} arp rows to hardware", rows.len().min(ARP_TABLE_DEPTH));
    Ok(())
}

/// Mirrors the active routing-table rows onto the hardware register
/// file, encoding the egress interface as a one-hot port bitmask.
pub async fn sync_routing_table(state: &RouterState, rtable: &RoutingTable) -> Result<(), crate::core::errors::RouterError> {
    let rows: Vec<_> = rtable.active_rows().collect();
    if rows.len() > ROUTE_TABLE_DEPTH {
        error!("routing table has {} active rows, hardware depth is {ROUTE_TABLE_DEPTH}; truncating", rows.len());
    }
    for i in 0..ROUTE_TABLE_DEPTH {
        let base = ROUTE_BASE_OFFSET + (i as u32) * ROUTE_ROW_WORDS;
        match rows.get(i) {
            Some(row) => {
                let port_mask = state
                    .interface_by_name(&row.egress_ifc)
                    .map(|ifc| ifc.port.bitmask())
                    .unwrap_or(0);
                state.hw.write_word(base, u32::from(row.dest)).await?;
                state.hw.write_word(base + 1, u32::from(row.mask)).await?;
                state.hw.write_word(base + 2, u32::from(row.gateway)).await?;
                state.hw.write_word(base + 3, port_mask as u32).await?;
            }
            None => {
                for w in 0..ROUTE_ROW_WORDS {
                    state.hw.write_word(base + w, 0).await?;
                }
            }
        }
    }
    info!("synced {} route rows to hardware", rows.len().min(ROUTE_TABLE_DEPTH));
    Ok(())
}

/// Writes the port-filter bitmask that the fast path consults to decide
/// whether a port's traffic is trapped to the control plane.
pub async fn sync_port_filter(hw: &dyn HwRegisterIo, trapped_ports: &[Port]) -> Result<(), crate::core::errors::RouterError> {
    let mask: u8 = trapped_ports.iter().fold(0, |acc, p| acc | p.bitmask());
    hw.write_word(0x3000, mask as u32).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arp_table::ArpCache;
    use crate::core::interface::Port;
    use crate::core::rtable::{RouteRow, RoutingTable};
    use crate::core::state::RouterState;
    use crate::netio::loopback::LoopbackRegisters;
    use chrono::Utc;
    use mac_address::MacAddress;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    #[tokio::test(flavor = "multi_thread")]
    async fn arp_sync_zeroes_unused_rows() {
        let regs = LoopbackRegisters::new();
        let state = RouterState::new(1, 0, 10, Vec::new(), HashMap::new(), Box::new(regs));
        let mut cache = ArpCache::new();
        cache.upsert(Ipv4Addr::new(10, 0, 0, 1), MacAddress::new([1, 2, 3, 4, 5, 6]), Utc::now(), true);
        sync_arp_cache(&state, &cache).await.unwrap();
        assert_eq!(state.hw.read_word(ARP_BASE_OFFSET).await.unwrap(), u32::from(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(state.hw.read_word(ARP_BASE_OFFSET + ARP_ROW_WORDS).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn route_sync_encodes_port_bitmask() {
        let mut interfaces = Vec::new();
        interfaces.push(crate::core::interface::Interface::new(
            Port::Eth1,
            "eth1",
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 0),
            MacAddress::new([0; 6]),
            1000,
        ));
        let state = RouterState::new(1, 0, 10, interfaces, HashMap::new(), Box::new(LoopbackRegisters::new()));
        let mut rtable = RoutingTable::new();
        rtable.insert(RouteRow {
            dest: Ipv4Addr::new(192, 168, 0, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(0, 0, 0, 0),
            egress_ifc: "eth1".to_string(),
            is_static: true,
            active: true,
        });
        sync_routing_table(&state, &rtable).await.unwrap();
        let port_word = state.hw.read_word(ROUTE_BASE_OFFSET + 3).await.unwrap();
        assert_eq!(port_word as u8, Port::Eth1.bitmask());
    }
}
