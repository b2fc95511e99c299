//! Read-only view over the network stack's interface chain.
//!
//! The stack owns a singly linked list of configured interfaces. This module
//! models that list as [`InterfaceChain`] and walks it with an explicit
//! forward iterator, rendering each node as an [`InterfaceRecord`].
//!
//! Traversal never mutates the chain. A chain handed to [`list_interfaces`]
//! is whatever snapshot the caller took; nothing here guarantees it is
//! consistent with the live stack.

use netdiag_types::{HwAddress, InterfaceFlags, Ipv4Address};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

/// DHCP client state attached to a DHCP-managed interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpLease {
    pub server: Ipv4Address,
    /// Client state machine code as reported by the stack.
    pub state: u8,
    pub tries: u8,
    /// Offered lease time in seconds.
    pub lease_time: u32,
}

/// One configured interface, as the stack stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    /// Short descriptive name, e.g. "ew" or "lo".
    pub name: String,
    pub index: u8,
    pub ip: Ipv4Address,
    pub netmask: Ipv4Address,
    pub gateway: Ipv4Address,
    pub hwaddr: HwAddress,
    pub mtu: u16,
    pub flags: InterfaceFlags,
    pub hostname: Option<String>,
    /// Lease record; only meaningful while `flags` has DHCP set.
    pub dhcp: Option<DhcpLease>,
}

impl NetInterface {
    pub fn new(name: impl Into<String>, index: u8) -> Self {
        Self {
            name: name.into(),
            index,
            ip: Ipv4Address::UNSPECIFIED,
            netmask: Ipv4Address::UNSPECIFIED,
            gateway: Ipv4Address::UNSPECIFIED,
            hwaddr: HwAddress::EMPTY,
            mtu: 0,
            flags: InterfaceFlags::empty(),
            hostname: None,
            dhcp: None,
        }
    }

    /// The lease, but only when the interface is actually DHCP-managed.
    pub fn active_lease(&self) -> Option<&DhcpLease> {
        if self.flags.is_dhcp() {
            self.dhcp.as_ref()
        } else {
            None
        }
    }

    pub fn record(&self) -> InterfaceRecord {
        InterfaceRecord::from(self)
    }
}

struct Node {
    iface: NetInterface,
    next: Option<Box<Node>>,
}

/// Singly linked chain of interfaces, head first.
#[derive(Default)]
pub struct InterfaceChain {
    head: Option<Box<Node>>,
    len: usize,
}

impl InterfaceChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links `iface` in as the new head, the way the stack adds interfaces.
    pub fn push_front(&mut self, iface: NetInterface) {
        let next = self.head.take();
        self.head = Some(Box::new(Node { iface, next }));
        self.len += 1;
    }

    pub fn first(&self) -> Option<&NetInterface> {
        self.head.as_deref().map(|node| &node.iface)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.as_deref(),
        }
    }
}

impl Drop for InterfaceChain {
    fn drop(&mut self) {
        let mut cur = self.head.take();
        while let Some(mut node) = cur {
            cur = node.next.take();
        }
    }
}

impl fmt::Debug for InterfaceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Builds a chain whose head is the first item yielded.
impl FromIterator<NetInterface> for InterfaceChain {
    fn from_iter<I: IntoIterator<Item = NetInterface>>(iter: I) -> Self {
        let items: Vec<NetInterface> = iter.into_iter().collect();
        let mut chain = InterfaceChain::new();
        for iface in items.into_iter().rev() {
            chain.push_front(iface);
        }
        chain
    }
}

impl<'a> IntoIterator for &'a InterfaceChain {
    type Item = &'a NetInterface;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// Forward iterator over a chain; ends at the node with no successor.
#[derive(Clone)]
pub struct Iter<'a> {
    next: Option<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a NetInterface;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.next.as_deref();
        Some(&node.iface)
    }
}

/// Lease fields of a formatted interface record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseRecord {
    pub server: Ipv4Address,
    pub state: u8,
    pub tries: u8,
    pub lease_time: u32,
}

/// Formatted, owned view of one interface.
///
/// `Display` renders the multi-line block printed by [`print_interfaces`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    pub name: String,
    pub index: u8,
    pub hwaddr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub ip: String,
    pub netmask: String,
    pub gateway: String,
    pub mtu: u16,
    pub flags: u8,
    pub flag_tokens: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseRecord>,
}

impl From<&NetInterface> for InterfaceRecord {
    fn from(iface: &NetInterface) -> Self {
        #[cfg(feature = "netif-hostname")]
        let hostname = iface.hostname.clone();
        #[cfg(not(feature = "netif-hostname"))]
        let hostname = None;

        Self {
            name: iface.name.clone(),
            index: iface.index,
            hwaddr: iface.hwaddr.to_string(),
            hostname,
            ip: iface.ip.to_string(),
            netmask: iface.netmask.to_string(),
            gateway: iface.gateway.to_string(),
            mtu: iface.mtu,
            flags: iface.flags.bits(),
            flag_tokens: iface.flags.to_string(),
            lease: iface.active_lease().map(|lease| LeaseRecord {
                server: lease.server,
                state: lease.state,
                tries: lease.tries,
                lease_time: lease.lease_time,
            }),
        }
    }
}

impl fmt::Display for InterfaceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} - HWaddr: {}", self.name, self.index, self.hwaddr)?;
        if let Some(hostname) = &self.hostname {
            write!(f, " hostname: {}", hostname)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "    IP: {} netmask: {} gw: {}",
            self.ip, self.netmask, self.gateway
        )?;
        write!(f, "    mtu: {} flags: 0x{:02X}", self.mtu, self.flags)?;
        if !self.flag_tokens.is_empty() {
            write!(f, " {}", self.flag_tokens)?;
        }
        writeln!(f)?;
        if let Some(lease) = &self.lease {
            writeln!(
                f,
                "    DHCP server: {} state: {} tries: {} lease time: {}",
                lease.server, lease.state, lease.tries, lease.lease_time
            )?;
        }
        Ok(())
    }
}

/// Lazily formats every interface from the head of `chain` to its end.
///
/// The returned iterator is `Clone`, so a caller can restart the walk
/// without touching the chain again.
pub fn list_interfaces(chain: &InterfaceChain) -> Records<'_> {
    Records { inner: chain.iter() }
}

/// Iterator returned by [`list_interfaces`].
#[derive(Clone)]
pub struct Records<'a> {
    inner: Iter<'a>,
}

impl Iterator for Records<'_> {
    type Item = InterfaceRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(InterfaceRecord::from)
    }
}

/// Writes one block per interface, each followed by a blank line.
pub fn print_interfaces<W: Write>(chain: &InterfaceChain, out: &mut W) -> io::Result<()> {
    for record in list_interfaces(chain) {
        writeln!(out, "{}", record)?;
    }
    Ok(())
}

/// Formats only the head interface, if there is one.
pub fn first_record(chain: &InterfaceChain) -> Option<InterfaceRecord> {
    chain.first().map(InterfaceRecord::from)
}
