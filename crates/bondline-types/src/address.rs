//! Account identifiers.
//!
//! Transcoders and delegators are identified by 20-byte addresses, rendered
//! as `0x`-prefixed lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Error returned when parsing an address from text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseAddressError {
    /// Input is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded input has the wrong length.
    #[error("invalid address length: expected {ADDRESS_LEN}, got {0}")]
    InvalidLength(usize),
}

/// A 20-byte account address. Serialized in its display form.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Build an address with every byte set to `byte`. Handy for fixtures.
    pub const fn repeat_byte(byte: u8) -> Self {
        Address([byte; ADDRESS_LEN])
    }

    /// Raw bytes of the address.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl From<[u8; ADDRESS_LEN]> for Address {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| ParseAddressError::InvalidHex(e.to_string()))?;
        let array: [u8; ADDRESS_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseAddressError::InvalidLength(bytes.len()))?;
        Ok(Address(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let addr = Address::repeat_byte(0xab);
        let text = addr.to_string();
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.parse::<Address>().expect("parse"), addr);
    }

    #[test]
    fn test_parse_without_prefix() {
        let addr: Address = "0101010101010101010101010101010101010101"
            .parse()
            .expect("parse");
        assert_eq!(addr, Address::repeat_byte(0x01));
    }

    #[test]
    fn test_parse_wrong_length() {
        let err = "0x0102".parse::<Address>().expect_err("too short");
        assert_eq!(err, ParseAddressError::InvalidLength(2));
    }

    #[test]
    fn test_parse_invalid_hex() {
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(ParseAddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_serde_display_form() {
        let addr = Address::repeat_byte(0x0f);
        let json = serde_json::to_string(&addr).expect("serialize");
        assert_eq!(json, format!("\"0x{}\"", "0f".repeat(20)));
        let back: Address = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, addr);
    }

    #[test]
    fn test_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::repeat_byte(1).is_zero());
    }
}
