//! Shortest-path computation over the topology database.
//!
//! Runs the seven steps against `TopologyDb`'s scratch fields (reused
//! across runs instead of reallocated, per step 1) and turns the result
//! into `RouteRow`s a caller can hand to `RoutingTable::replace_dynamic`.
//! Unit edge weight: a link counts as one hop regardless of speed.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use chrono::Utc;

use super::interface::Interface;
use super::pwospf::Advertisement;
use super::rtable::RouteRow;
use super::topology::TopologyDb;

/// This router's own advertisement set, built from its interfaces the
/// same way a neighbor's LSU is built from theirs: one router-link
/// advertisement per adjacency, or a bare subnet advertisement when an
/// interface has no adjacency yet. Shared between LSU origination and
/// `refresh_self` so both see the same set.
pub fn self_advertisements(interfaces: &[Interface]) -> Vec<Advertisement> {
    let mut advertisements = Vec::new();
    for ifc in interfaces {
        let runtime = ifc.runtime.lock().unwrap();
        if runtime.neighbors.is_empty() {
            advertisements.push(Advertisement { subnet: ifc.ip, mask: ifc.mask, neighbor_router_id: 0 });
        } else {
            for neighbor in &runtime.neighbors {
                advertisements.push(Advertisement { subnet: ifc.ip, mask: ifc.mask, neighbor_router_id: neighbor.neighbor_router_id });
            }
        }
    }
    advertisements
}

/// First hop discovered for a router-id reachable from us: the directly
/// adjacent neighbor's IP and the local interface it's reachable through.
#[derive(Debug, Clone, Copy)]
struct FirstHop {
    gateway: Ipv4Addr,
    egress_ifc_index: usize,
}

/// Runs Dijkstra from `self_router_id` over `topology` and returns the
/// dynamic routing-table rows it implies. Deterministic given the same
/// topology and interface set (idempotence: re-running with
/// unchanged input must yield a bit-identical `RTABLE`).
pub fn compute_routes(topology: &mut TopologyDb, interfaces: &[Interface], area_id: u32) -> Vec<RouteRow> {
    // Exactly one record per router-id, including self: refresh it from
    // the live interface/neighbor state before every run so self is
    // walked by the same algorithm as any other router instead of being
    // special-cased in and out.
    topology.refresh_self(area_id, self_advertisements(interfaces), Utc::now());

    // Step 1: reset scratch on every known router.
    topology.reset_all_scratch();

    let self_id = topology.self_router_id;
    let mut distance: HashMap<u32, u32> = HashMap::new();
    let mut predecessor: HashMap<u32, u32> = HashMap::new();
    let mut visited: std::collections::HashSet<u32> = std::collections::HashSet::new();

    // Step 2: self is distance zero, everything else starts unreachable.
    distance.insert(self_id, 0);
    for r in topology.iter() {
        distance.entry(r.router_id).or_insert(u32::MAX);
    }

    // Step 3-5: repeatedly settle the closest unvisited node and relax
    // its outgoing router-to-router links.
    loop {
        let next = distance
            .iter()
            .filter(|(id, _)| !visited.contains(*id))
            .filter(|(_, d)| **d != u32::MAX)
            .min_by_key(|(_, d)| **d)
            .map(|(id, d)| (*id, *d));

        let Some((current, current_dist)) = next else { break };
        visited.insert(current);

        let neighbors: Vec<u32> = if current == self_id {
            interfaces.iter().flat_map(|ifc| ifc.runtime.lock().unwrap().neighbors.iter().map(|n| n.neighbor_router_id).collect::<Vec<_>>()).collect()
        } else {
            match topology.get(current) {
                Some(r) => r.advertisements.iter().map(|a| a.neighbor_router_id).filter(|id| *id != 0).collect(),
                None => Vec::new(),
            }
        };

        for neighbor_id in neighbors {
            if visited.contains(&neighbor_id) {
                continue;
            }
            let candidate = current_dist + 1;
            let existing = distance.entry(neighbor_id).or_insert(u32::MAX);
            if candidate < *existing {
                *existing = candidate;
                predecessor.insert(neighbor_id, current);
            }
        }
    }

    // Step 6: record results back onto the scratch fields so other
    // readers (diagnostics) can see the last computed tree.
    for (router_id, dist) in &distance {
        if let Some(record) = topology.get_mut(*router_id) {
            record.distance = *dist;
            record.spf_found = visited.contains(router_id);
            record.predecessor = predecessor.get(router_id).copied();
        }
    }

    // First hop for every reachable router: walk predecessors back to
    // self and keep the last router-id visited before landing on self.
    let mut first_hop_of: HashMap<u32, u32> = HashMap::new();
    for router_id in distance.keys().copied().filter(|id| *id != self_id) {
        let mut walker = router_id;
        let mut hop = router_id;
        while let Some(&pred) = predecessor.get(&walker) {
            if pred == self_id {
                hop = walker;
                break;
            }
            walker = pred;
        }
        first_hop_of.insert(router_id, hop);
    }

    let direct_links = direct_neighbor_links(interfaces);

    // Step 7: one RouteRow per subnet any reachable router advertises,
    // via the first-hop neighbor's address and interface. Self is walked
    // too: its own subnets are directly connected, so they use the
    // on-link convention (gateway 0.0.0.0) instead of a first hop.
    let mut rows = Vec::new();
    for router_id in distance.keys().copied().filter(|id| visited.contains(id)) {
        let Some(record) = topology.get(router_id) else { continue };

        if router_id == self_id {
            for adv in &record.advertisements {
                if adv.neighbor_router_id != 0 {
                    continue;
                }
                let Some(ifc) = interfaces.iter().find(|i| i.matches_subnet(adv.subnet) && i.mask == adv.mask) else { continue };
                rows.push(RouteRow {
                    dest: adv.subnet,
                    mask: adv.mask,
                    gateway: Ipv4Addr::new(0, 0, 0, 0),
                    egress_ifc: ifc.name.clone(),
                    is_static: false,
                    active: true,
                });
            }
            continue;
        }

        let Some(&hop_router_id) = first_hop_of.get(&router_id) else { continue };
        let Some(first_hop) = direct_links.get(&hop_router_id) else { continue };
        for adv in &record.advertisements {
            if adv.neighbor_router_id != 0 {
                // router-to-router link, not a locally reachable subnet
                continue;
            }
            rows.push(RouteRow {
                dest: adv.subnet,
                mask: adv.mask,
                gateway: first_hop.gateway,
                egress_ifc: interfaces[first_hop.egress_ifc_index].name.clone(),
                is_static: false,
                active: true,
            });
        }
    }
    rows
}

fn direct_neighbor_links(interfaces: &[Interface]) -> HashMap<u32, FirstHop> {
    let mut links = HashMap::new();
    for (idx, ifc) in interfaces.iter().enumerate() {
        for neighbor in &ifc.runtime.lock().unwrap().neighbors {
            links.insert(neighbor.neighbor_router_id, FirstHop { gateway: neighbor.neighbor_ip, egress_ifc_index: idx });
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::interface::{NeighborRecord, Port};
    use crate::core::pwospf::Advertisement;
    use chrono::Utc;
    use mac_address::MacAddress;

    fn make_interface(port: Port, ip: [u8; 4]) -> Interface {
        Interface::new(port, port.name(), Ipv4Addr::from(ip), Ipv4Addr::new(255, 255, 255, 0), MacAddress::new([0; 6]), 1000)
    }

    #[test]
    fn direct_neighbor_gets_single_hop_route() {
        let ifc = make_interface(Port::Eth0, [10, 0, 0, 1]);
        ifc.runtime.lock().unwrap().neighbors.push(NeighborRecord {
            neighbor_ip: Ipv4Addr::new(10, 0, 0, 2),
            neighbor_router_id: 2,
            last_hello: Utc::now(),
        });
        let interfaces = vec![ifc];

        let mut topo = TopologyDb::new(1);
        topo.accept_lsu(
            2,
            0,
            1,
            Utc::now(),
            vec![Advertisement { subnet: Ipv4Addr::new(10, 0, 1, 0), mask: Ipv4Addr::new(255, 255, 255, 0), neighbor_router_id: 0 }],
        );

        let rows = compute_routes(&mut topo, &interfaces, 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dest, Ipv4Addr::new(10, 0, 1, 0));
        assert_eq!(rows[0].gateway, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(rows[0].egress_ifc, "eth0");
    }

    #[test]
    fn unreachable_router_contributes_no_route() {
        let ifc = make_interface(Port::Eth0, [10, 0, 0, 1]);
        ifc.runtime.lock().unwrap().neighbors.push(NeighborRecord {
            neighbor_ip: Ipv4Addr::new(10, 0, 0, 2),
            neighbor_router_id: 2,
            last_hello: Utc::now(),
        });
        let interfaces = vec![ifc];
        let mut topo = TopologyDb::new(1);
        topo.accept_lsu(
            99,
            0,
            1,
            Utc::now(),
            vec![Advertisement { subnet: Ipv4Addr::new(172, 16, 0, 0), mask: Ipv4Addr::new(255, 255, 0, 0), neighbor_router_id: 0 }],
        );
        let rows = compute_routes(&mut topo, &interfaces, 0);
        assert!(rows.iter().all(|r| r.dest != Ipv4Addr::new(172, 16, 0, 0)), "router 99 is unreachable from self, its subnet must not appear");
    }

    #[test]
    fn self_interface_without_neighbor_gets_directly_connected_route() {
        let interfaces = vec![make_interface(Port::Eth0, [10, 0, 0, 1])];
        let mut topo = TopologyDb::new(1);

        let rows = compute_routes(&mut topo, &interfaces, 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dest, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(rows[0].gateway, Ipv4Addr::new(0, 0, 0, 0), "self's own subnet is on-link");
        assert_eq!(rows[0].egress_ifc, "eth0");
        assert!(!rows[0].is_static);
    }

    #[test]
    fn two_hop_path_uses_first_hop_neighbor() {
        let ifc = make_interface(Port::Eth0, [10, 0, 0, 1]);
        ifc.runtime.lock().unwrap().neighbors.push(NeighborRecord {
            neighbor_ip: Ipv4Addr::new(10, 0, 0, 2),
            neighbor_router_id: 2,
            last_hello: Utc::now(),
        });
        let interfaces = vec![ifc];

        let mut topo = TopologyDb::new(1);
        topo.accept_lsu(
            2,
            0,
            1,
            Utc::now(),
            vec![Advertisement { subnet: Ipv4Addr::new(0, 0, 0, 0), mask: Ipv4Addr::new(0, 0, 0, 0), neighbor_router_id: 3 }],
        );
        topo.accept_lsu(
            3,
            0,
            1,
            Utc::now(),
            vec![Advertisement { subnet: Ipv4Addr::new(192, 168, 5, 0), mask: Ipv4Addr::new(255, 255, 255, 0), neighbor_router_id: 0 }],
        );

        let rows = compute_routes(&mut topo, &interfaces, 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].dest, Ipv4Addr::new(192, 168, 5, 0));
        assert_eq!(rows[0].gateway, Ipv4Addr::new(10, 0, 0, 2));
    }
}
