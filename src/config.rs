//! Boot-time configuration parsing.
//!
//! No serde: every input is parsed the same field-by-field way the
//! codecs in `core::packet` parse wire bytes. A malformed config is an
//! abort-with-nonzero-exit condition, so `main` is the one place that's
//! allowed to `expect` on these results.

use std::net::Ipv4Addr;
use std::str::FromStr;

use mac_address::MacAddress;

use crate::core::errors::RouterError;
use crate::core::interface::{Interface, Port};
use crate::core::rtable::RouteRow;

#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub port: Port,
    pub name: String,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub mac: MacAddress,
    pub speed_mbps: u32,
}

impl InterfaceConfig {
    pub fn into_interface(self) -> Interface {
        Interface::new(self.port, self.name, self.ip, self.mask, self.mac, self.speed_mbps)
    }
}

#[derive(Debug, Clone)]
pub struct RouterIdentity {
    pub router_id: u32,
    pub area_id: u32,
    pub hello_interval: u16,
}

/// One line per interface: `<port> <name> <ip> <mask> <mac> <speed_mbps>`.
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_interfaces(text: &str) -> Result<Vec<InterfaceConfig>, RouterError> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_interface_line)
        .collect()
}

fn parse_interface_line(line: &str) -> Result<InterfaceConfig, RouterError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [port, name, ip, mask, mac, speed] = fields[..] else {
        return Err(RouterError::Configuration(format!("expected 6 fields, got: {line}")));
    };
    Ok(InterfaceConfig {
        port: Port::by_name(port).ok_or_else(|| RouterError::Configuration(format!("unknown port {port}")))?,
        name: name.to_string(),
        ip: parse_ip(ip)?,
        mask: parse_ip(mask)?,
        mac: MacAddress::from_str(mac).map_err(|e| RouterError::Configuration(format!("bad mac {mac}: {e}")))?,
        speed_mbps: speed.parse().map_err(|_| RouterError::Configuration(format!("bad speed {speed}")))?,
    })
}

/// One line per static route: `<dest> <mask> <gateway> <egress_ifc>`.
/// A gateway of `0.0.0.0` means "on-link".
pub fn parse_static_routes(text: &str) -> Result<Vec<RouteRow>, RouterError> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_static_route_line)
        .collect()
}

fn parse_static_route_line(line: &str) -> Result<RouteRow, RouterError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [dest, mask, gateway, ifc] = fields[..] else {
        return Err(RouterError::Configuration(format!("expected 4 fields, got: {line}")));
    };
    Ok(RouteRow {
        dest: parse_ip(dest)?,
        mask: parse_ip(mask)?,
        gateway: parse_ip(gateway)?,
        egress_ifc: ifc.to_string(),
        is_static: true,
        active: true,
    })
}

/// Single line: `<router_id> <area_id> <hello_interval>`.
pub fn parse_identity(text: &str) -> Result<RouterIdentity, RouterError> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| RouterError::Configuration("identity file has no content".into()))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [router_id, area_id, hello_interval] = fields[..] else {
        return Err(RouterError::Configuration(format!("expected 3 fields, got: {line}")));
    };
    Ok(RouterIdentity {
        router_id: parse_ip(router_id).map(u32::from).or_else(|_| router_id.parse().map_err(|_| RouterError::Configuration(format!("bad router_id {router_id}"))))?,
        area_id: area_id.parse().map_err(|_| RouterError::Configuration(format!("bad area_id {area_id}")))?,
        hello_interval: hello_interval.parse().map_err(|_| RouterError::Configuration(format!("bad hello_interval {hello_interval}")))?,
    })
}

fn parse_ip(s: &str) -> Result<Ipv4Addr, RouterError> {
    Ipv4Addr::from_str(s).map_err(|e| RouterError::Configuration(format!("bad address {s}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interface_lines_and_skips_comments() {
        let text = "# comment\neth0 eth0 10.0.0.1 255.255.255.0 aa:bb:cc:dd:ee:ff 1000\n\n";
        let parsed = parse_interfaces(text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].ip, Ipv4Addr::new(10, 0, 0, 1));
    }

    #[test]
    fn parses_static_routes_with_on_link_convention() {
        let text = "192.168.0.0 255.255.255.0 0.0.0.0 eth0";
        let rows = parse_static_routes(text).unwrap();
        assert_eq!(rows[0].next_hop(Ipv4Addr::new(192, 168, 0, 5)), Ipv4Addr::new(192, 168, 0, 5));
    }

    #[test]
    fn parses_router_identity() {
        let identity = parse_identity("1 0 10\n").unwrap();
        assert_eq!(identity.router_id, 1);
        assert_eq!(identity.hello_interval, 10);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(parse_interfaces("eth0 only-two-fields").is_err());
    }
}
