//! Snapshot of the host's interface table.
//!
//! Host interfaces are mapped onto the device interface model so the same
//! listing code renders both. DHCP state is not visible here and is never
//! reported.

use netdiag_types::Ipv4Address;
use std::collections::HashMap;

use crate::error::Result;
use crate::iface::InterfaceChain;

const ROUTE_FLAG_GATEWAY: u32 = 0x0002;

/// Reads the current interface table into a fresh chain.
pub fn snapshot_interfaces() -> Result<InterfaceChain> {
    sys::snapshot()
}

/// Splits "eth0" into ("eth", 0). Names without a numeric suffix that fits
/// in a `u8` are kept whole with index 0.
fn split_name(name: &str) -> (String, u8) {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if prefix.is_empty() || prefix.len() == name.len() {
        return (name.to_string(), 0);
    }
    match name[prefix.len()..].parse::<u8>() {
        Ok(index) => (prefix.to_string(), index),
        Err(_) => (name.to_string(), 0),
    }
}

/// Default gateways per interface from `/proc/net/route` text.
fn parse_default_gateways(table: &str) -> HashMap<String, Ipv4Address> {
    let mut gateways = HashMap::new();
    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [iface, destination, gateway, flags, ..] = fields.as_slice() else {
            continue;
        };
        let (Ok(destination), Ok(gateway), Ok(flags)) = (
            u32::from_str_radix(destination, 16),
            u32::from_str_radix(gateway, 16),
            u32::from_str_radix(flags, 16),
        ) else {
            continue;
        };
        if destination == 0 && flags & ROUTE_FLAG_GATEWAY != 0 {
            // The kernel prints the raw network-order word in host order.
            gateways
                .entry(iface.to_string())
                .or_insert_with(|| Ipv4Address::from(gateway.to_ne_bytes()));
        }
    }
    gateways
}

#[cfg(target_os = "linux")]
mod sys {
    use super::*;
    use crate::error::NetdiagError;
    use crate::iface::NetInterface;
    use netdiag_types::{HwAddress, InterfaceFlags};
    use nix::ifaddrs::getifaddrs;
    use nix::net::if_::InterfaceFlags as OsFlags;
    use std::net::SocketAddrV4;
    use tracing::debug;

    pub(super) fn snapshot() -> Result<InterfaceChain> {
        let addrs = getifaddrs().map_err(|e| NetdiagError::Interfaces(e.to_string()))?;
        let gateways = std::fs::read_to_string("/proc/net/route")
            .map(|table| parse_default_gateways(&table))
            .unwrap_or_default();

        // Keyed by OS name, in order of first appearance.
        let mut order: Vec<String> = Vec::new();
        let mut by_name: HashMap<String, NetInterface> = HashMap::new();

        for ifaddr in addrs {
            let os_name = ifaddr.interface_name.clone();
            let iface = by_name.entry(os_name.clone()).or_insert_with(|| {
                order.push(os_name.clone());
                let (name, index) = split_name(&os_name);
                let mut iface = NetInterface::new(name, index);
                iface.flags = map_flags(ifaddr.flags);
                iface.mtu = read_mtu(&os_name).unwrap_or(0);
                iface.gateway = gateways
                    .get(&os_name)
                    .copied()
                    .unwrap_or(Ipv4Address::UNSPECIFIED);
                iface
            });

            let Some(address) = ifaddr.address.as_ref() else {
                continue;
            };
            if let Some(sin) = address.as_sockaddr_in() {
                if iface.ip == Ipv4Address::UNSPECIFIED {
                    iface.ip = Ipv4Address::from(*SocketAddrV4::from(*sin).ip());
                    if let Some(mask) = ifaddr.netmask.as_ref().and_then(|m| m.as_sockaddr_in()) {
                        iface.netmask = Ipv4Address::from(*SocketAddrV4::from(*mask).ip());
                    }
                }
            } else if let Some(link) = address.as_link_addr() {
                if let Some(bytes) = link.addr() {
                    if let Ok(hw) = HwAddress::new(&bytes) {
                        iface.hwaddr = hw;
                    }
                    if bytes.iter().any(|b| *b != 0) {
                        iface.flags |= InterfaceFlags::ETHERNET;
                    }
                }
            }
        }

        debug!(count = order.len(), "Snapshot of host interfaces taken");
        Ok(order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect())
    }

    fn map_flags(os: OsFlags) -> InterfaceFlags {
        let mut flags = InterfaceFlags::empty();
        for (os_flag, flag) in [
            (OsFlags::IFF_UP, InterfaceFlags::UP),
            (OsFlags::IFF_BROADCAST, InterfaceFlags::BROADCAST),
            (OsFlags::IFF_POINTOPOINT, InterfaceFlags::POINTTOPOINT),
            (OsFlags::IFF_RUNNING, InterfaceFlags::LINK_UP),
            (OsFlags::IFF_MULTICAST, InterfaceFlags::IGMP),
        ] {
            if os.contains(os_flag) {
                flags |= flag;
            }
        }
        if !os.contains(OsFlags::IFF_NOARP) {
            flags |= InterfaceFlags::ETHARP;
        }
        flags
    }

    fn read_mtu(name: &str) -> Option<u16> {
        std::fs::read_to_string(format!("/sys/class/net/{}/mtu", name))
            .ok()?
            .trim()
            .parse::<u32>()
            .ok()
            .map(|mtu| mtu.min(u16::MAX as u32) as u16)
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use super::*;
    use crate::error::NetdiagError;

    pub(super) fn snapshot() -> Result<InterfaceChain> {
        Err(NetdiagError::Interfaces(
            "interface enumeration is not supported on this platform".to_string(),
        ))
    }
}
