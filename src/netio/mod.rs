//! Out-of-scope raw I/O, specified here only as the traits this crate
//! depends on: a real binary wires these to raw sockets and hardware
//! registers; this crate only calls them.
//!
//! One ingress/egress trait pair per router port, trait objects so the
//! dispatcher and background tasks never need to know whether they're
//! talking to a real socket or a test double.

pub mod loopback;

use async_trait::async_trait;

use crate::core::errors::RouterError;

/// Reads raw Ethernet frames off one port. A real implementation wraps a
/// raw socket or a NetFPGA DMA ring; tests use `loopback::LoopbackPort`.
#[async_trait]
pub trait PortIngress: Send + Sync {
    async fn recv_frame(&self) -> Result<Vec<u8>, RouterError>;
}

/// Writes raw Ethernet frames to one port.
#[async_trait]
pub trait PortEgress: Send + Sync {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), RouterError>;
}

/// Hardware register surface: word-addressed reads/writes the
/// fast-path datapath exposes. `hwsync` builds the typed ARP/route/port
/// table writers on top of this.
#[async_trait]
pub trait HwRegisterIo: Send + Sync {
    async fn read_word(&self, offset: u32) -> Result<u32, RouterError>;
    async fn write_word(&self, offset: u32, value: u32) -> Result<(), RouterError>;
}
