//! Multicells: named regions grouping a span of cells under one head
//! address (functions, arrays, structures, string regions).

use std::collections::BTreeSet;

use core_address::Address;

/// Variant payload of a multicell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiCellKind {
    /// A function: entry is the head address, `blocks` the addresses of
    /// its basic-block leaders.
    Function { blocks: BTreeSet<Address> },
    /// A homogeneous array of `element_size`-byte elements.
    Array { element_size: u16 },
    Struct,
    StringRegion,
}

/// A region of the document keyed by its head address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiCell {
    kind: MultiCellKind,
    size: u64,
}

impl MultiCell {
    pub fn function(size: u64, blocks: BTreeSet<Address>) -> Self {
        Self {
            kind: MultiCellKind::Function { blocks },
            size,
        }
    }

    pub fn array(element_size: u16, count: u64) -> Self {
        Self {
            kind: MultiCellKind::Array { element_size },
            size: u64::from(element_size) * count,
        }
    }

    pub fn structure(size: u64) -> Self {
        Self {
            kind: MultiCellKind::Struct,
            size,
        }
    }

    pub fn string_region(size: u64) -> Self {
        Self {
            kind: MultiCellKind::StringRegion,
            size,
        }
    }

    pub fn kind(&self) -> &MultiCellKind {
        &self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, MultiCellKind::Function { .. })
    }

    /// Basic-block leaders when this is a function.
    pub fn blocks(&self) -> Option<&BTreeSet<Address>> {
        match &self.kind {
            MultiCellKind::Function { blocks } => Some(blocks),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_size_is_element_times_count() {
        let mc = MultiCell::array(4, 16);
        assert_eq!(mc.size(), 64);
    }

    #[test]
    fn function_exposes_blocks() {
        let blocks: BTreeSet<_> = [Address::linear(0x100, 32), Address::linear(0x110, 32)]
            .into_iter()
            .collect();
        let mc = MultiCell::function(0x20, blocks.clone());
        assert!(mc.is_function());
        assert_eq!(mc.blocks(), Some(&blocks));
        assert_eq!(MultiCell::string_region(5).blocks(), None);
    }
}
