//! Error kinds for the router core, grouped by failure domain.
//!
//! Kept hand-rolled (no `thiserror`): a small enum with a `Display`
//! impl, nothing more.

use std::fmt::{self, Display};
use std::net::Ipv4Addr;

#[derive(Debug)]
pub enum RouterError {
    /// Packet failed codec validation and was dropped silently upstream;
    /// this variant exists so callers can still count/log the reason.
    Malformed(&'static str),
    /// No RTABLE row matched the destination.
    NoRoute(Ipv4Addr),
    /// ARP resolution exhausted its retry budget.
    ArpUnresolvable(Ipv4Addr),
    /// A hardware register write failed; fatal for the calling task.
    Hardware(String),
    /// Configuration was invalid at boot.
    Configuration(String),
}

impl Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::Malformed(reason) => write!(f, "malformed packet: {reason}"),
            RouterError::NoRoute(dst) => write!(f, "no route to {dst}"),
            RouterError::ArpUnresolvable(ip) => write!(f, "arp unresolvable for {ip}"),
            RouterError::Hardware(msg) => write!(f, "hardware I/O failure: {msg}"),
            RouterError::Configuration(msg) => write!(f, "configuration failure: {msg}"),
        }
    }
}

impl std::error::Error for RouterError {}
