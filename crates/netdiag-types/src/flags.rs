//! Interface flag bitmask and its human-readable rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interface state flags, one bit per property.
///
/// Bits are independent: an interface can be up, DHCP-managed and have its
/// link up at the same time.
///
/// # Examples
///
/// ```
/// use netdiag_types::InterfaceFlags;
///
/// let flags = InterfaceFlags::UP | InterfaceFlags::DHCP | InterfaceFlags::LINK_UP;
/// assert_eq!(flags.to_string(), "UP DHCP LNKUP");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceFlags(u8);

/// Bit-to-token table, in rendering order.
const TOKENS: [(InterfaceFlags, &str); 8] = [
    (InterfaceFlags::UP, "UP"),
    (InterfaceFlags::BROADCAST, "BRCST"),
    (InterfaceFlags::POINTTOPOINT, "PTP"),
    (InterfaceFlags::DHCP, "DHCP"),
    (InterfaceFlags::LINK_UP, "LNKUP"),
    (InterfaceFlags::ETHARP, "ETHARP"),
    (InterfaceFlags::ETHERNET, "ETHERNET"),
    (InterfaceFlags::IGMP, "IGMP"),
];

impl InterfaceFlags {
    pub const UP: Self = InterfaceFlags(0x01);
    pub const BROADCAST: Self = InterfaceFlags(0x02);
    pub const POINTTOPOINT: Self = InterfaceFlags(0x04);
    pub const DHCP: Self = InterfaceFlags(0x08);
    pub const LINK_UP: Self = InterfaceFlags(0x10);
    pub const ETHARP: Self = InterfaceFlags(0x20);
    pub const ETHERNET: Self = InterfaceFlags(0x40);
    pub const IGMP: Self = InterfaceFlags(0x80);

    pub const fn empty() -> Self {
        InterfaceFlags(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        InterfaceFlags(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub const fn contains(&self, other: InterfaceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_up(&self) -> bool {
        self.contains(Self::UP)
    }

    pub const fn is_dhcp(&self) -> bool {
        self.contains(Self::DHCP)
    }

    pub const fn is_link_up(&self) -> bool {
        self.contains(Self::LINK_UP)
    }

    /// Tokens for the set bits, in fixed table order.
    pub fn tokens(&self) -> FlagTokens {
        FlagTokens {
            flags: *self,
            next: 0,
        }
    }
}

impl std::ops::BitOr for InterfaceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        InterfaceFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for InterfaceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<u8> for InterfaceFlags {
    fn from(bits: u8) -> Self {
        InterfaceFlags(bits)
    }
}

/// Iterator over the tokens of the set flag bits.
#[derive(Debug, Clone)]
pub struct FlagTokens {
    flags: InterfaceFlags,
    next: usize,
}

impl Iterator for FlagTokens {
    type Item = &'static str;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < TOKENS.len() {
            let (bit, token) = TOKENS[self.next];
            self.next += 1;
            if self.flags.contains(bit) {
                return Some(token);
            }
        }
        None
    }
}

/// Space-separated token list, empty when no bit is set.
impl fmt::Display for InterfaceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(token)?;
        }
        Ok(())
    }
}
