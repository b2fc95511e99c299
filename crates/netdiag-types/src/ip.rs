//! IPv4 address type with safe parsing.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 address as stored on an interface or used as a probe target.
///
/// # Examples
///
/// ```
/// use netdiag_types::Ipv4Address;
///
/// let addr: Ipv4Address = "192.168.4.1".parse().unwrap();
/// assert_eq!(addr.to_string(), "192.168.4.1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Address(Ipv4Addr);

impl Ipv4Address {
    pub const UNSPECIFIED: Self = Ipv4Address(Ipv4Addr::UNSPECIFIED);
    pub const BROADCAST: Self = Ipv4Address(Ipv4Addr::BROADCAST);
    pub const LOCALHOST: Self = Ipv4Address(Ipv4Addr::LOCALHOST);

    /// Longest dotted rendering, "255.255.255.255".
    pub const MAX_TEXT_LEN: usize = 15;

    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Ipv4Address(Ipv4Addr::new(a, b, c, d))
    }

    /// Builds an address from a host-order 32-bit value.
    pub const fn from_bits(bits: u32) -> Self {
        Ipv4Address(Ipv4Addr::from_bits(bits))
    }

    pub const fn to_bits(&self) -> u32 {
        self.0.to_bits()
    }

    pub const fn inner(&self) -> Ipv4Addr {
        self.0
    }

    pub const fn octets(&self) -> [u8; 4] {
        self.0.octets()
    }

    /// Returns true for the two values a resolver uses to mean "no address":
    /// all-zeros and all-ones.
    pub const fn is_none_marker(&self) -> bool {
        self.0.is_unspecified() || self.0.is_broadcast()
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Ipv4Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Ipv4Addr>()
            .map(Ipv4Address)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<Ipv4Addr> for Ipv4Address {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Address(addr)
    }
}

impl From<Ipv4Address> for Ipv4Addr {
    fn from(addr: Ipv4Address) -> Self {
        addr.0
    }
}

impl From<[u8; 4]> for Ipv4Address {
    fn from(octets: [u8; 4]) -> Self {
        Ipv4Address(Ipv4Addr::from(octets))
    }
}
