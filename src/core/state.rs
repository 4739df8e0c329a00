//! `RouterState`: the single process-wide owner of every piece of
//! shared state, threaded as `Arc<RouterState>` into every spawned task
//! and handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify, RwLock};

use crate::netio::{HwRegisterIo, PortEgress};

use super::arp_table::{ArpCache, ArpQueue};
use super::interface::Interface;
use super::rtable::RoutingTable;
use super::topology::TopologyDb;

/// Lock ordering (outer to inner): arp_cache -> arp_queue -> rtable
/// -> topology -> lsu_out. Per-interface `Mutex<InterfaceRuntime>` and
/// the egress-port mutexes are innermost, same standing as the
/// send-mutex. Never acquire a lock out of this order.
pub struct RouterState {
    pub router_id: u32,
    pub area_id: u32,
    pub hello_interval: u16,

    pub interfaces: Vec<Interface>,
    pub arp_cache: RwLock<ArpCache>,
    pub arp_queue: RwLock<ArpQueue>,
    pub rtable: RwLock<RoutingTable>,
    pub topology: Mutex<TopologyDb>,
    pub lsu_out: Mutex<Vec<Vec<u8>>>,

    pub egress: HashMap<String, Mutex<Box<dyn PortEgress>>>,
    pub hw: Box<dyn HwRegisterIo>,

    pub lsu_sequence: std::sync::atomic::AtomicU16,
    pub dijkstra_dirty: Notify,
    pub lsu_notify: Notify,
    stop: AtomicBool,
}

impl RouterState {
    pub fn new(
        router_id: u32,
        area_id: u32,
        hello_interval: u16,
        interfaces: Vec<Interface>,
        egress: HashMap<String, Mutex<Box<dyn PortEgress>>>,
        hw: Box<dyn HwRegisterIo>,
    ) -> Self {
        Self {
            router_id,
            area_id,
            hello_interval,
            interfaces,
            arp_cache: RwLock::new(ArpCache::new()),
            arp_queue: RwLock::new(ArpQueue::new()),
            rtable: RwLock::new(RoutingTable::new()),
            topology: Mutex::new(TopologyDb::new(router_id)),
            lsu_out: Mutex::new(Vec::new()),
            egress,
            hw,
            lsu_sequence: std::sync::atomic::AtomicU16::new(0),
            dijkstra_dirty: Notify::new(),
            lsu_notify: Notify::new(),
            stop: AtomicBool::new(false),
        }
    }

    pub fn interface_by_name(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn next_lsu_sequence(&self) -> u16 {
        self.lsu_sequence.fetch_add(1, Ordering::SeqCst)
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.dijkstra_dirty.notify_waiters();
        self.lsu_notify.notify_waiters();
    }
}
