use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Integer encoding width of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::W8),
            16 => Some(Self::W16),
            32 => Some(Self::W32),
            64 => Some(Self::W64),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::W8 => 1,
            Self::W16 => 2,
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Whether `value` is representable as a signed or unsigned integer of this width
    fn fits(self, value: i64) -> bool {
        match self {
            Self::W8 => (i8::MIN as i64..=u8::MAX as i64).contains(&value),
            Self::W16 => (i16::MIN as i64..=u16::MAX as i64).contains(&value),
            Self::W32 => (i32::MIN as i64..=u32::MAX as i64).contains(&value),
            Self::W64 => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// A fixed-length literal byte sequence searched for verbatim.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BytePattern(Vec<u8>);

impl BytePattern {
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidPattern("pattern is empty".to_string()));
        }
        Ok(Self(bytes))
    }

    /// Encode `value` at `width` bytes in the given byte order
    pub fn from_int(value: i64, width: IntWidth, endian: Endian) -> Result<Self> {
        if !width.fits(value) {
            return Err(Error::InvalidPattern(format!(
                "{} does not fit in {} bytes",
                value,
                width.bytes()
            )));
        }
        let le = value.to_le_bytes();
        let mut bytes = le[..width.bytes()].to_vec();
        if endian == Endian::Big {
            bytes.reverse();
        }
        Ok(Self(bytes))
    }

    /// 32-bit little-endian encoding, the layout of a C# `int` field
    pub fn le32(value: i32) -> Self {
        Self(value.to_le_bytes().to_vec())
    }

    /// Parse space-separated hex bytes, e.g. `"04 00 00 00"`
    pub fn parse(pattern: &str) -> Result<Self> {
        let bytes = pattern
            .split_whitespace()
            .map(|token| {
                u8::from_str_radix(token, 16).map_err(|e| {
                    Error::InvalidPattern(format!("invalid token '{}': {}", token, e))
                })
            })
            .collect::<Result<Vec<u8>>>()?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BytePattern({})", self)
    }
}

impl TryFrom<String> for BytePattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<BytePattern> for String {
    fn from(pattern: BytePattern) -> Self {
        pattern.to_string()
    }
}

impl AsRef<[u8]> for BytePattern {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
