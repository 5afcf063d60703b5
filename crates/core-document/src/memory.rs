//! Memory areas and the memory map.
//!
//! A memory area binds a contiguous virtual range to a slice of the
//! binary stream with access attributes and a default decoding context.
//! The map keeps areas ordered by start address and pairwise disjoint,
//! which is what makes address-to-stream translation a single lookup.

use std::collections::BTreeMap;

use core_address::Address;

use crate::DocumentError;
use crate::cell::ArchTag;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AreaAccess: u8 {
        const READ    = 1;
        const WRITE   = 2;
        const EXECUTE = 4;
    }
}

/// A contiguous mapped range with access attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArea {
    name: String,
    start: Address,
    size: u64,
    access: AreaAccess,
    backing_offset: u64,
    arch_tag: ArchTag,
    mode: u8,
}

impl MemoryArea {
    pub fn new(
        name: impl Into<String>,
        start: Address,
        size: u64,
        access: AreaAccess,
        backing_offset: u64,
        arch_tag: ArchTag,
        mode: u8,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            size,
            access,
            backing_offset,
            arch_tag,
            mode,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn access(&self) -> AreaAccess {
        self.access
    }

    pub fn backing_offset(&self) -> u64 {
        self.backing_offset
    }

    pub fn arch_tag(&self) -> ArchTag {
        self.arch_tag
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    /// One past the last contained offset, in the area's address space.
    pub fn end_offset(&self) -> u64 {
        self.start.offset().saturating_add(self.size)
    }

    pub fn contains(&self, address: &Address) -> bool {
        address.kind() == self.start.kind()
            && address.base() == self.start.base()
            && address.offset() >= self.start.offset()
            && address.offset() < self.end_offset()
    }

    /// Stream offset backing `address`, when the address falls inside.
    pub fn translate(&self, address: &Address) -> Option<u64> {
        if !self.contains(address) {
            return None;
        }
        Some(self.backing_offset + (address.offset() - self.start.offset()))
    }

    fn overlaps(&self, other: &MemoryArea) -> bool {
        self.start.kind() == other.start.kind()
            && self.start.base() == other.start.base()
            && self.start.offset() < other.end_offset()
            && other.start.offset() < self.end_offset()
    }
}

/// Ordered, non-overlapping collection of memory areas.
#[derive(Debug, Default)]
pub struct MemoryMap {
    areas: BTreeMap<Address, MemoryArea>,
}

impl MemoryMap {
    /// Insert an area, rejecting any range intersection with an existing
    /// one. The map is unchanged on rejection.
    pub fn add(&mut self, area: MemoryArea) -> Result<(), DocumentError> {
        // Only the nearest neighbor on each side can intersect a
        // candidate, given the existing areas are disjoint.
        let before = self.areas.range(..=area.start()).next_back();
        let after = self.areas.range(area.start()..).next();
        for (_, neighbor) in before.into_iter().chain(after) {
            if neighbor.overlaps(&area) {
                return Err(DocumentError::Overlap);
            }
        }
        self.areas.insert(area.start(), area);
        Ok(())
    }

    /// The area containing `address`.
    pub fn find(&self, address: &Address) -> Option<&MemoryArea> {
        self.areas
            .range(..=*address)
            .next_back()
            .map(|(_, area)| area)
            .filter(|area| area.contains(address))
    }

    /// Translate `address` to its backing stream offset.
    pub fn translate(&self, address: &Address) -> Option<u64> {
        self.find(address)?.translate(address)
    }

    /// Areas in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryArea> {
        self.areas.values()
    }

    pub fn first(&self) -> Option<&MemoryArea> {
        self.areas.values().next()
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(name: &str, start: u64, size: u64) -> MemoryArea {
        MemoryArea::new(
            name,
            Address::linear(start, 32),
            size,
            AreaAccess::READ | AreaAccess::EXECUTE,
            0,
            ArchTag::UNKNOWN,
            0,
        )
    }

    #[test]
    fn disjoint_areas_insert_and_resolve() {
        let mut map = MemoryMap::default();
        map.add(area(".text", 0x1000, 0x1000)).unwrap();
        assert!(matches!(
            map.add(area(".bad", 0x1800, 0x1000)),
            Err(DocumentError::Overlap)
        ));
        map.add(area(".data", 0x2000, 0x1000)).unwrap();

        let found = map.find(&Address::linear(0x1FFF, 32)).unwrap();
        assert_eq!(found.name(), ".text");
        let found = map.find(&Address::linear(0x2000, 32)).unwrap();
        assert_eq!(found.name(), ".data");
        assert!(map.find(&Address::linear(0x3000, 32)).is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn rejected_insert_leaves_map_unchanged() {
        let mut map = MemoryMap::default();
        map.add(area(".text", 0x1000, 0x1000)).unwrap();
        let _ = map.add(area(".bad", 0x0800, 0x1000));
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().next().unwrap().name(), ".text");
    }

    #[test]
    fn translation_is_offset_plus_backing() {
        let mut map = MemoryMap::default();
        let mut text = area(".text", 0x1000, 0x1000);
        text.backing_offset = 0x400;
        map.add(text).unwrap();
        assert_eq!(map.translate(&Address::linear(0x1010, 32)), Some(0x410));
        assert_eq!(map.translate(&Address::linear(0x0FFF, 32)), None);
        assert_eq!(map.translate(&Address::linear(0x2000, 32)), None);
    }

    #[test]
    fn areas_in_different_spaces_do_not_overlap() {
        let mut map = MemoryMap::default();
        map.add(area(".flat", 0x1000, 0x1000)).unwrap();
        let segmented = MemoryArea::new(
            ".seg",
            Address::logical(0x10, 0x1000, 32),
            0x1000,
            AreaAccess::READ,
            0,
            ArchTag::UNKNOWN,
            0,
        );
        map.add(segmented).unwrap();
        assert_eq!(map.len(), 2);
    }
}
