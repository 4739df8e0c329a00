//! Link-state topology database keyed by PWOSPF router record.
//!
//! Keyed by router-id the same way `arp_table` keys by IPv4 — both are
//! dense `u32` identities, so `nohash-hasher` again stands in for
//! `std::collections::hash_map::RandomState`.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use nohash_hasher::NoHashHasher;

use super::pwospf::Advertisement;

type U32Map<V> = HashMap<u32, V, BuildHasherDefault<NoHashHasher<u32>>>;

/// Outcome of `TopologyDb::accept_lsu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsuAcceptance {
    pub accepted: bool,
    pub content_changed: bool,
}

/// One router's last-known link-state, plus scratch fields Dijkstra
/// reuses every run instead of re-allocating.
#[derive(Debug, Clone)]
pub struct RouterRecord {
    pub router_id: u32,
    pub area_id: u32,
    pub last_sequence: u16,
    pub last_update: DateTime<Utc>,
    pub advertisements: Vec<Advertisement>,

    // Dijkstra scratch, reset and refilled each recomputation:
    pub distance: u32,
    pub spf_found: bool,
    pub predecessor: Option<u32>,
}

impl RouterRecord {
    fn new(router_id: u32, area_id: u32, sequence: u16, now: DateTime<Utc>, advertisements: Vec<Advertisement>) -> Self {
        Self {
            router_id,
            area_id,
            last_sequence: sequence,
            last_update: now,
            advertisements,
            distance: u32::MAX,
            spf_found: false,
            predecessor: None,
        }
    }

    fn reset_scratch(&mut self) {
        self.distance = u32::MAX;
        self.spf_found = false;
        self.predecessor = None;
    }
}

#[derive(Debug)]
pub struct TopologyDb {
    pub self_router_id: u32,
    routers: U32Map<RouterRecord>,
}

impl TopologyDb {
    pub fn new(self_router_id: u32) -> Self {
        Self { self_router_id, routers: U32Map::default() }
    }

    /// LSU acceptance: a newer sequence number replaces the full
    /// advertisement set (merge is "take the newest", not "union").
    /// `accepted` (sequence progress or a brand-new router) is what gates
    /// reflooding; `content_changed` is the narrower signal that gates a
    /// Dijkstra re-run, since an accepted LSU can still carry the same
    /// advertisement set under a fresher sequence number.
    pub fn accept_lsu(&mut self, router_id: u32, area_id: u32, sequence: u16, now: DateTime<Utc>, advertisements: Vec<Advertisement>) -> LsuAcceptance {
        match self.routers.get_mut(&router_id) {
            Some(existing) => {
                if !sequence_is_newer(existing.last_sequence, sequence) {
                    return LsuAcceptance { accepted: false, content_changed: false };
                }
                let content_changed = !same_advertisement_set(&existing.advertisements, &advertisements);
                existing.last_sequence = sequence;
                existing.last_update = now;
                existing.advertisements = advertisements;
                LsuAcceptance { accepted: true, content_changed }
            }
            None => {
                self.routers.insert(router_id, RouterRecord::new(router_id, area_id, sequence, now, advertisements));
                LsuAcceptance { accepted: true, content_changed: true }
            }
        }
    }

    /// Inserts or refreshes the record for `self_router_id`, built fresh
    /// from the router's own interfaces/advertisements on every call —
    /// there's exactly one record per router-id, including this one, so
    /// Dijkstra can walk self the same way it walks every other router.
    pub fn refresh_self(&mut self, area_id: u32, advertisements: Vec<Advertisement>, now: DateTime<Utc>) {
        let id = self.self_router_id;
        match self.routers.get_mut(&id) {
            Some(existing) => {
                existing.area_id = area_id;
                existing.last_update = now;
                existing.advertisements = advertisements;
            }
            None => {
                self.routers.insert(id, RouterRecord::new(id, area_id, 0, now, advertisements));
            }
        }
    }

    pub fn get(&self, router_id: u32) -> Option<&RouterRecord> {
        self.routers.get(&router_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouterRecord> {
        self.routers.values()
    }

    pub fn reset_all_scratch(&mut self) {
        for r in self.routers.values_mut() {
            r.reset_scratch();
        }
    }

    pub fn get_mut(&mut self, router_id: u32) -> Option<&mut RouterRecord> {
        self.routers.get_mut(&router_id)
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }
}

/// PWOSPF sequence numbers wrap; a sequence counts as newer under a
/// signed 16-bit wraparound comparison, the same rule TCP uses for SEQ.
fn sequence_is_newer(old: u16, new: u16) -> bool {
    (new.wrapping_sub(old) as i16) > 0
}

fn same_advertisement_set(a: &[Advertisement], b: &[Advertisement]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let a_keys: Vec<_> = a.iter().map(Advertisement::merge_key).sorted().collect();
    let b_keys: Vec<_> = b.iter().map(Advertisement::merge_key).sorted().collect();
    a_keys == b_keys
}
