//! Routing table and longest-prefix match.
//!
//! Kept as a single sorted `Vec` behind one `RwLock`, mutated in place —
//! the LPM scan is a linear walk whose stopping rule depends on sort
//! order, so an unsorted map filtered on a timer can't stand in here;
//! sorting after every mutation keeps the invariant local to this
//! module instead of smeared across callers.

use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRow {
    pub dest: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub egress_ifc: String,
    pub is_static: bool,
    /// Cleared when the owning PWOSPF neighbor/adjacency disappears;
    /// inactive dynamic rows are excluded from lookup and write-back
    /// but kept around so Dijkstra can cheaply recompute without
    /// re-allocating across idempotent recomputations.
    pub active: bool,
}

impl RouteRow {
    fn mask_len(&self) -> u32 {
        u32::from(self.mask).count_ones()
    }

    pub fn matches(&self, dest: Ipv4Addr) -> bool {
        u32::from(dest) & u32::from(self.mask) == u32::from(self.dest) & u32::from(self.mask)
    }

    /// "On-link" convention: a zero gateway means the destination
    /// itself is the next hop to ARP-resolve.
    pub fn next_hop(&self, dest: Ipv4Addr) -> Ipv4Addr {
        if self.gateway == Ipv4Addr::new(0, 0, 0, 0) {
            dest
        } else {
            self.gateway
        }
    }
}

/// Sort order: longest mask first, then destination descending,
/// then static rows before dynamic rows — all tie-break rules the LPM scan
/// depends on to return the first match.
fn route_order(a: &RouteRow, b: &RouteRow) -> std::cmp::Ordering {
    b.mask_len()
        .cmp(&a.mask_len())
        .then_with(|| u32::from(b.dest).cmp(&u32::from(a.dest)))
        .then_with(|| b.is_static.cmp(&a.is_static))
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    rows: Vec<RouteRow>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn resort(&mut self) {
        self.rows.sort_by(route_order);
    }

    pub fn insert(&mut self, row: RouteRow) {
        self.rows.retain(|r| !(r.dest == row.dest && r.mask == row.mask && r.gateway == row.gateway && r.egress_ifc == row.egress_ifc));
        self.rows.push(row);
        self.resort();
    }

    /// Replaces every dynamic (non-static) row with `rows` (Dijkstra's
    /// output), leaving static rows untouched.
    pub fn replace_dynamic(&mut self, rows: Vec<RouteRow>) {
        self.rows.retain(|r| r.is_static);
        self.rows.extend(rows);
        self.resort();
    }

    pub fn lookup(&self, dest: Ipv4Addr) -> Option<&RouteRow> {
        self.rows.iter().find(|r| r.active && r.matches(dest))
    }

    pub fn rows(&self) -> &[RouteRow] {
        &self.rows
    }

    pub fn active_rows(&self) -> impl Iterator<Item = &RouteRow> {
        self.rows.iter().filter(|r| r.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(dest: [u8; 4], mask: [u8; 4], gw: [u8; 4], is_static: bool) -> RouteRow {
        RouteRow {
            dest: Ipv4Addr::from(dest),
            mask: Ipv4Addr::from(mask),
            gateway: Ipv4Addr::from(gw),
            egress_ifc: "eth0".into(),
            is_static,
            active: true,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let mut rt = RoutingTable::new();
        rt.insert(row([10, 0, 0, 0], [255, 0, 0, 0], [0, 0, 0, 0], true));
        rt.insert(row([10, 0, 1, 0], [255, 255, 255, 0], [10, 0, 0, 1], false));
        let found = rt.lookup(Ipv4Addr::new(10, 0, 1, 5)).unwrap();
        assert_eq!(found.mask, Ipv4Addr::new(255, 255, 255, 0));
    }

    #[test]
    fn on_link_convention_uses_dest_as_next_hop() {
        let r = row([10, 0, 0, 0], [255, 255, 255, 0], [0, 0, 0, 0], true);
        assert_eq!(r.next_hop(Ipv4Addr::new(10, 0, 0, 9)), Ipv4Addr::new(10, 0, 0, 9));
    }

    #[test]
    fn replace_dynamic_preserves_static_rows() {
        let mut rt = RoutingTable::new();
        rt.insert(row([192, 168, 0, 0], [255, 255, 255, 0], [0, 0, 0, 0], true));
        rt.replace_dynamic(vec![row([172, 16, 0, 0], [255, 255, 0, 0], [10, 0, 0, 2], false)]);
        assert_eq!(rt.rows().len(), 2);
        assert!(rt.rows().iter().any(|r| r.is_static));
        assert!(rt.rows().iter().any(|r| !r.is_static));
    }

    #[test]
    fn inactive_rows_excluded_from_lookup() {
        let mut rt = RoutingTable::new();
        let mut r = row([10, 0, 0, 0], [255, 255, 255, 0], [0, 0, 0, 0], false);
        r.active = false;
        rt.insert(r);
        assert!(rt.lookup(Ipv4Addr::new(10, 0, 0, 5)).is_none());
    }
}
