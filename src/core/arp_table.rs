//! ARP cache and ARP resolution queue.
//!
//! Keyed by `u32` (the IPv4 address as a native integer) through
//! `nohash-hasher`, the same "the key already is the hash" shortcut used
//! for router-ids in the topology DB — IPv4 addresses and router-ids
//! are both dense 32-bit identities with no benefit from re-hashing.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use mac_address::MacAddress;
use nohash_hasher::NoHashHasher;

type U32Map<V> = HashMap<u32, V, BuildHasherDefault<NoHashHasher<u32>>>;

pub const T_ARP_SECONDS: i64 = 300;
pub const ARP_REQUEST_INTERVAL_SECONDS: i64 = 1;
pub const ARP_MAX_REQUESTS: u8 = 5;

#[derive(Debug, Clone)]
pub struct ArpCacheEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
    pub last_refreshed: DateTime<Utc>,
    pub is_static: bool,
}

impl ArpCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_static && (now - self.last_refreshed).num_seconds() > T_ARP_SECONDS
    }
}

/// IPv4 -> MAC mapping; at most one entry per IPv4.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: U32Map<ArpCacheEntry>,
    /// Insertion order of static entries, needed by the HW mirror layout
    /// ("static entries first in discovered order").
    static_order: Vec<u32>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        self.entries.get(&u32::from(ip)).map(|e| e.mac)
    }

    /// Inserts or refreshes an entry. A static load or ARP reply both
    /// call this; overwriting implicitly destroys the prior entry.
    pub fn upsert(&mut self, ip: Ipv4Addr, mac: MacAddress, now: DateTime<Utc>, is_static: bool) {
        let key = u32::from(ip);
        if is_static && !self.static_order.contains(&key) {
            self.static_order.push(key);
        }
        self.entries.insert(key, ArpCacheEntry { ip, mac, last_refreshed: now, is_static });
    }

    /// Removes non-static entries older than `T_ARP`; returns true if
    /// anything changed (callers use this to decide whether to rewrite
    /// the HW mirror).
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        self.static_order.retain(|k| self.entries.contains_key(k));
        self.entries.len() != before
    }

    /// Rows for the HW mirror: static entries first in discovered order,
    /// then the remaining (non-static) entries in arbitrary order;
    /// callers zero whatever rows this iterator doesn't fill.
    pub fn hw_rows(&self) -> Vec<&ArpCacheEntry> {
        let mut rows: Vec<&ArpCacheEntry> = Vec::with_capacity(self.entries.len());
        for key in &self.static_order {
            if let Some(e) = self.entries.get(key) {
                rows.push(e);
            }
        }
        for (key, e) in &self.entries {
            if !self.static_order.contains(key) {
                rows.push(e);
            }
        }
        rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Bytes of one buffered frame awaiting ARP resolution, owned by the
/// queue (the dispatcher's receive buffer is borrowed and only copied
/// once it lands here).
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub bytes: Vec<u8>,
    /// Original IP source, needed to address an eventual ICMP Host
    /// Unreachable if resolution gives up.
    pub original_src: Ipv4Addr,
}

#[derive(Debug)]
pub struct ArpQueueEntry {
    pub egress_ifc: String,
    pub request_count: u8,
    pub last_request: DateTime<Utc>,
    pub pending: Vec<PendingFrame>,
}

/// Per-unresolved-next-hop pending frames; at most one entry per next-hop
/// IPv4.
#[derive(Debug, Default)]
pub struct ArpQueue {
    entries: U32Map<ArpQueueEntry>,
}

impl ArpQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, next_hop: Ipv4Addr) -> bool {
        self.entries.contains_key(&u32::from(next_hop))
    }

    /// Creates the entry if absent (returning `true` the first time, so
    /// the caller knows to send the initial ARP request) and always
    /// appends `frame`.
    pub fn enqueue(&mut self, next_hop: Ipv4Addr, egress_ifc: &str, now: DateTime<Utc>, frame: PendingFrame) -> bool {
        let key = u32::from(next_hop);
        let created = !self.entries.contains_key(&key);
        let entry = self.entries.entry(key).or_insert_with(|| ArpQueueEntry {
            egress_ifc: egress_ifc.to_string(),
            request_count: 0,
            last_request: now,
            pending: Vec::new(),
        });
        entry.pending.push(frame);
        if created {
            entry.request_count = 1;
            entry.last_request = now;
        }
        created
    }

    pub fn remove(&mut self, next_hop: Ipv4Addr) -> Option<ArpQueueEntry> {
        self.entries.remove(&u32::from(next_hop))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Ipv4Addr, &mut ArpQueueEntry)> {
        self.entries.iter_mut().map(|(k, v)| (Ipv4Addr::from(*k), v))
    }

    pub fn drain_expired_requests(&mut self, now: DateTime<Utc>) -> Vec<(Ipv4Addr, ArpQueueEntry)> {
        let mut timed_out = Vec::new();
        let keys: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, e)| e.request_count >= ARP_MAX_REQUESTS)
            .map(|(k, _)| *k)
            .collect();
        for key in keys {
            if let Some(entry) = self.entries.remove(&key) {
                timed_out.push((Ipv4Addr::from(key), entry));
            }
        }
        let _ = now;
        timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddress {
        MacAddress::new([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn one_entry_per_ip_and_static_never_expires() {
        let mut cache = ArpCache::new();
        let now = Utc::now();
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        cache.upsert(ip, mac(1), now - chrono::Duration::seconds(10_000), true);
        assert!(!cache.expire(now));
        assert_eq!(cache.lookup(ip), Some(mac(1)));
    }

    #[test]
    fn non_static_expires_past_ttl() {
        let mut cache = ArpCache::new();
        let now = Utc::now();
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        cache.upsert(ip, mac(2), now - chrono::Duration::seconds(T_ARP_SECONDS + 1), false);
        assert!(cache.expire(now));
        assert_eq!(cache.lookup(ip), None);
    }

    #[test]
    fn hw_rows_put_static_first_in_discovery_order() {
        let mut cache = ArpCache::new();
        let now = Utc::now();
        cache.upsert(Ipv4Addr::new(10, 0, 0, 9), mac(9), now, false);
        cache.upsert(Ipv4Addr::new(10, 0, 0, 1), mac(1), now, true);
        cache.upsert(Ipv4Addr::new(10, 0, 0, 2), mac(2), now, true);
        let rows = cache.hw_rows();
        assert_eq!(rows[0].ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(rows[1].ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(rows[2].ip, Ipv4Addr::new(10, 0, 0, 9));
    }

    #[test]
    fn queue_creates_once_and_accumulates_pending() {
        let mut queue = ArpQueue::new();
        let now = Utc::now();
        let nh = Ipv4Addr::new(10, 0, 0, 5);
        let created1 = queue.enqueue(nh, "eth0", now, PendingFrame { bytes: vec![1], original_src: Ipv4Addr::new(1, 1, 1, 1) });
        let created2 = queue.enqueue(nh, "eth0", now, PendingFrame { bytes: vec![2], original_src: Ipv4Addr::new(1, 1, 1, 1) });
        assert!(created1);
        assert!(!created2);
        let entry = queue.remove(nh).unwrap();
        assert_eq!(entry.pending.len(), 2);
    }

    #[test]
    fn queue_gives_up_at_request_cap() {
        let mut queue = ArpQueue::new();
        let now = Utc::now();
        let nh = Ipv4Addr::new(10, 0, 0, 6);
        queue.enqueue(nh, "eth0", now, PendingFrame { bytes: vec![1], original_src: Ipv4Addr::new(1, 1, 1, 1) });
        for (_, e) in queue.iter_mut() {
            e.request_count = ARP_MAX_REQUESTS;
        }
        let timed_out = queue.drain_expired_requests(now);
        assert_eq!(timed_out.len(), 1);
        assert!(queue.remove(nh).is_none());
    }
}
