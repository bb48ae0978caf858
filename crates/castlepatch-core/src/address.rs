//! Strongly typed addresses in the target process.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An address inside the target process's address space.
///
/// Arithmetic is limited to adding byte offsets so that unrelated integers
/// (lengths, values, pids) cannot be mixed into address computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Address `offset` bytes after this one (wrapping at the top of the space)
    pub const fn add(self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset as u64))
    }

    /// Byte distance from `base` to this address, if this address is not below `base`
    pub fn offset_from(self, base: Address) -> Option<usize> {
        self.0
            .checked_sub(base.0)
            .and_then(|d| usize::try_from(d).ok())
    }

    /// Parse `0x1234`, `0X1234` or bare hex
    pub fn parse_hex(s: &str) -> Option<Self> {
        let digits = s
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        u64::from_str_radix(digits, 16).ok().map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse_hex(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid address '{}'", s)))
    }
}
