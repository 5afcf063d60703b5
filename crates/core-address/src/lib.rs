//! Structured byte locators.
//!
//! An [`Address`] is the (kind, base, offset, bit width) tuple used as the
//! key for every store in the document: cells, multicells, labels, memory
//! areas, cross-references, and comments all index by it. It is a pure
//! value: cheap to copy, totally ordered by (kind, base, offset), and
//! round-trippable through its `base:offset` text form.
//!
//! The bit width participates in formatting (an offset is zero-padded to
//! `bit_size / 4` hex digits) but not in comparison: two addresses that
//! name the same byte are equal regardless of the width they were decoded
//! with.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

/// How an address is to be interpreted against the memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressKind {
    Unknown,
    Physical,
    Linear,
    Logical,
    RelativeLogical,
}

impl AddressKind {
    /// Kinds that carry a meaningful base component.
    fn has_base(self) -> bool {
        matches!(self, AddressKind::Logical | AddressKind::RelativeLogical)
    }
}

/// A structured byte locator: addressing kind, base, offset, bit width.
#[derive(Debug, Clone, Copy)]
pub struct Address {
    kind: AddressKind,
    base: u64,
    offset: u64,
    bit_size: u16,
}

impl Address {
    pub fn new(kind: AddressKind, base: u64, offset: u64, bit_size: u16) -> Self {
        Self {
            kind,
            base,
            offset,
            bit_size,
        }
    }

    /// A linear (flat) address with no base component.
    pub fn linear(offset: u64, bit_size: u16) -> Self {
        Self::new(AddressKind::Linear, 0, offset, bit_size)
    }

    /// A segmented logical address.
    pub fn logical(base: u64, offset: u64, bit_size: u16) -> Self {
        Self::new(AddressKind::Logical, base, offset, bit_size)
    }

    pub fn physical(offset: u64, bit_size: u16) -> Self {
        Self::new(AddressKind::Physical, 0, offset, bit_size)
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn bit_size(&self) -> u16 {
        self.bit_size
    }

    /// The address `delta` bytes further on, or `None` on offset overflow.
    pub fn add_offset(&self, delta: u64) -> Option<Self> {
        Some(Self {
            offset: self.offset.checked_add(delta)?,
            ..*self
        })
    }

    /// The address `delta` bytes back, or `None` on underflow.
    pub fn sub_offset(&self, delta: u64) -> Option<Self> {
        Some(Self {
            offset: self.offset.checked_sub(delta)?,
            ..*self
        })
    }

    /// Same location with a different offset.
    pub fn with_offset(&self, offset: u64) -> Self {
        Self { offset, ..*self }
    }

    /// Byte distance from `earlier` to `self` within the same (kind, base)
    /// space. `None` when the spaces differ or `earlier` is past `self`.
    pub fn distance_from(&self, earlier: &Address) -> Option<u64> {
        if self.kind != earlier.kind || self.base != earlier.base {
            return None;
        }
        self.offset.checked_sub(earlier.offset)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.base == other.base && self.offset == other.offset
    }
}

impl Eq for Address {}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then(self.base.cmp(&other.base))
            .then(self.offset.cmp(&other.offset))
    }
}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.base.hash(state);
        self.offset.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = (self.bit_size / 4) as usize;
        if self.kind.has_base() {
            write!(f, "{:x}:{:0width$x}", self.base, self.offset)
        } else {
            write!(f, "{:0width$x}", self.offset)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseAddressError {
    #[error("empty address")]
    Empty,
    #[error("invalid hex component {0:?}")]
    InvalidHex(String),
}

fn parse_hex(token: &str) -> Result<(u64, usize), ParseAddressError> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if digits.is_empty() {
        return Err(ParseAddressError::Empty);
    }
    let value = u64::from_str_radix(digits, 16)
        .map_err(|_| ParseAddressError::InvalidHex(token.to_string()))?;
    Ok((value, digits.len()))
}

/// Round the printed digit count up to a 16/32/64 bit width.
fn infer_bit_size(hex_digits: usize) -> u16 {
    match hex_digits {
        0..=4 => 16,
        5..=8 => 32,
        _ => 64,
    }
}

impl FromStr for Address {
    type Err = ParseAddressError;

    /// Accepts `[base:]offset` in hex with optional `0x` prefixes. A
    /// present base yields a logical address; a bare offset a linear one.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseAddressError::Empty);
        }
        match s.split_once(':') {
            Some((base, offset)) => {
                let (base, _) = parse_hex(base)?;
                let (offset, digits) = parse_hex(offset)?;
                Ok(Address::logical(base, offset, infer_bit_size(digits)))
            }
            None => {
                let (offset, digits) = parse_hex(s)?;
                Ok(Address::linear(offset, infer_bit_size(digits)))
            }
        }
    }
}
