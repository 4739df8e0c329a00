//! Physical/CPU port identity, the fixed interface table, and
//! per-interface neighbor bookkeeping.

use std::net::Ipv4Addr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use enum_iterator::Sequence;
use mac_address::MacAddress;

/// The eight fast-path ports: four physical, four CPU, each with a
/// fixed one-hot bit in the hardware port-filter bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub enum Port {
    Eth0,
    Eth1,
    Eth2,
    Eth3,
    Cpu0,
    Cpu1,
    Cpu2,
    Cpu3,
}

impl Port {
    pub fn bitmask(self) -> u8 {
        match self {
            Port::Eth0 => 1,
            Port::Eth1 => 4,
            Port::Eth2 => 16,
            Port::Eth3 => 64,
            Port::Cpu0 => 2,
            Port::Cpu1 => 8,
            Port::Cpu2 => 32,
            Port::Cpu3 => 128,
        }
    }

    pub fn by_name(name: &str) -> Option<Port> {
        enum_iterator::all::<Port>().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Port::Eth0 => "eth0",
            Port::Eth1 => "eth1",
            Port::Eth2 => "eth2",
            Port::Eth3 => "eth3",
            Port::Cpu0 => "cpu0",
            Port::Cpu1 => "cpu1",
            Port::Cpu2 => "cpu2",
            Port::Cpu3 => "cpu3",
        }
    }
}

/// A PWOSPF neighbor seen on one of our interfaces.
#[derive(Debug, Clone)]
pub struct NeighborRecord {
    pub neighbor_ip: Ipv4Addr,
    pub neighbor_router_id: u32,
    pub last_hello: DateTime<Utc>,
}

impl NeighborRecord {
    /// `(now - last_hello) > 3 * hello_interval` removes the neighbor.
    pub fn is_expired(&self, now: DateTime<Utc>, hello_interval: u16) -> bool {
        let timeout = chrono::Duration::seconds(3 * hello_interval as i64);
        now - self.last_hello > timeout
    }
}

/// Mutable, per-interface runtime state. Kept behind its own `Mutex` so
/// HELLO/LSU handlers on different interfaces never contend with each
/// other; treated as an innermost lock, the same standing as the
/// send-mutex, in the state's lock ordering discipline.
#[derive(Debug, Default)]
pub struct InterfaceRuntime {
    pub neighbors: Vec<NeighborRecord>,
    pub last_hello_sent: Option<DateTime<Utc>>,
}

/// One physical port, created at boot and never destroyed.
#[derive(Debug)]
pub struct Interface {
    pub port: Port,
    pub name: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mac: MacAddress,
    pub speed_mbps: u32,
    pub runtime: Mutex<InterfaceRuntime>,
}

impl Interface {
    pub fn new(port: Port, name: impl Into<String>, ip: Ipv4Addr, mask: Ipv4Addr, mac: MacAddress, speed_mbps: u32) -> Self {
        Self {
            port,
            name: name.into(),
            ip,
            mask,
            mac,
            speed_mbps,
            runtime: Mutex::new(InterfaceRuntime::default()),
        }
    }

    pub fn matches_subnet(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.ip) & u32::from(self.mask)
    }
}
