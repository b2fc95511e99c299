//! Link-layer (hardware) address type.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of bytes a hardware address may hold.
pub const MAX_HWADDR_LEN: usize = 6;

/// A link-layer address of up to [`MAX_HWADDR_LEN`] bytes.
///
/// Interfaces without a link layer (loopback, point-to-point tunnels) carry
/// an empty address.
///
/// # Examples
///
/// ```
/// use netdiag_types::HwAddress;
///
/// let hw = HwAddress::new(&[0x5c, 0xcf, 0x7f, 0x01, 0x02, 0x03]).unwrap();
/// assert_eq!(hw.to_string(), "5c:cf:7f:01:02:03");
/// assert!(HwAddress::new(&[0; 8]).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HwAddress {
    bytes: [u8; MAX_HWADDR_LEN],
    len: u8,
}

impl HwAddress {
    /// The empty address.
    pub const EMPTY: HwAddress = HwAddress {
        bytes: [0; MAX_HWADDR_LEN],
        len: 0,
    };

    /// Creates an address from raw bytes, rejecting anything longer than
    /// [`MAX_HWADDR_LEN`].
    pub fn new(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() > MAX_HWADDR_LEN {
            return Err(ParseError::HwAddressTooLong(bytes.len()));
        }
        let mut buf = [0u8; MAX_HWADDR_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(HwAddress {
            bytes: buf,
            len: bytes.len() as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for HwAddress {
    fn default() -> Self {
        HwAddress::EMPTY
    }
}

impl fmt::Display for HwAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for HwAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(HwAddress::EMPTY);
        }

        let separator = if s.contains(':') { ':' } else { '-' };
        let mut bytes = Vec::with_capacity(MAX_HWADDR_LEN);
        for part in s.split(separator) {
            if part.len() != 2 {
                return Err(ParseError::InvalidHwAddress(s.to_string()));
            }
            let byte = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidHwAddress(s.to_string()))?;
            bytes.push(byte);
        }

        HwAddress::new(&bytes)
    }
}

impl TryFrom<String> for HwAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HwAddress> for String {
    fn from(hw: HwAddress) -> String {
        hw.to_string()
    }
}

impl From<[u8; MAX_HWADDR_LEN]> for HwAddress {
    fn from(bytes: [u8; MAX_HWADDR_LEN]) -> Self {
        HwAddress {
            bytes,
            len: MAX_HWADDR_LEN as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_colon_hex() {
        let hw = HwAddress::from([0xaa, 0xbb, 0xcc, 0x0d, 0x0e, 0x0f]);
        assert_eq!(hw.to_string(), "aa:bb:cc:0d:0e:0f");
    }

    #[test]
    fn test_display_short_and_empty() {
        let hw = HwAddress::new(&[0x01, 0x02]).unwrap();
        assert_eq!(hw.to_string(), "01:02");
        assert_eq!(HwAddress::EMPTY.to_string(), "");
        assert!(HwAddress::EMPTY.is_empty());
    }

    #[test]
    fn test_length_bounded() {
        assert_eq!(
            HwAddress::new(&[0; 7]),
            Err(ParseError::HwAddressTooLong(7))
        );
        assert_eq!(HwAddress::new(&[0; 6]).unwrap().len(), 6);
    }

    #[test]
    fn test_parse() {
        let hw: HwAddress = "5c-cf-7f-01-02-03".parse().unwrap();
        assert_eq!(hw.as_bytes(), &[0x5c, 0xcf, 0x7f, 0x01, 0x02, 0x03]);
        assert!("5c:cf:7f:01:02:03:04".parse::<HwAddress>().is_err());
        assert!("zz:00".parse::<HwAddress>().is_err());
        assert!("5:cf".parse::<HwAddress>().is_err());
    }
}
