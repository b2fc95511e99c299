//! Value types shared by the netdiag interface view and ping engine.
//!
//! Everything in this crate is pure formatting and parsing, no I/O:
//!
//! - [`Ipv4Address`]: 32-bit interface/target addresses in dotted notation
//! - [`HwAddress`]: variable-length link-layer addresses, at most
//!   [`MAX_HWADDR_LEN`] bytes
//! - [`InterfaceFlags`]: the interface state bitmask and its token rendering

mod flags;
mod hwaddr;
mod ip;

pub use flags::{FlagTokens, InterfaceFlags};
pub use hwaddr::{HwAddress, MAX_HWADDR_LEN};
pub use ip::Ipv4Address;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid IPv4 address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid hardware address format: {0}")]
    InvalidHwAddress(String),

    #[error("hardware address too long: {0} bytes (max {max})", max = MAX_HWADDR_LEN)]
    HwAddressTooLong(usize),
}
