//! Labels: named aliases for addresses, unique by name per document.

use std::collections::{BTreeMap, HashMap};

use core_address::Address;

use crate::DocumentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Code,
    Data,
    Imported,
    Exported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    name: String,
    kind: LabelKind,
}

impl Label {
    pub fn new(name: impl Into<String>, kind: LabelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }
}

/// Bidirectional address <-> name index. The two maps are mutated only
/// together, under the document's write lock.
#[derive(Debug, Default)]
pub struct LabelIndex {
    by_address: BTreeMap<Address, Label>,
    by_name: HashMap<String, Address>,
}

impl LabelIndex {
    /// Bind `label` to `address`. A name already bound to a different
    /// address is a conflict; rebinding an address replaces its previous
    /// label, which is returned so the caller can publish its removal.
    pub fn insert(&mut self, address: Address, label: Label) -> Result<Option<Label>, DocumentError> {
        if let Some(existing) = self.by_name.get(label.name())
            && *existing != address
        {
            return Err(DocumentError::Conflict);
        }
        let previous = self.by_address.insert(address, label.clone());
        if let Some(previous) = &previous {
            self.by_name.remove(previous.name());
        }
        self.by_name.insert(label.name().to_string(), address);
        Ok(previous)
    }

    pub fn remove(&mut self, address: &Address) -> Option<Label> {
        let label = self.by_address.remove(address)?;
        self.by_name.remove(label.name());
        Some(label)
    }

    pub fn at(&self, address: &Address) -> Option<&Label> {
        self.by_address.get(address)
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Label)> {
        self.by_address.iter()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_between_name_and_address() {
        let mut index = LabelIndex::default();
        let addr = Address::linear(0x1000, 32);
        index
            .insert(addr, Label::new("start", LabelKind::Code))
            .unwrap();
        assert_eq!(index.address_of("start"), Some(addr));
        assert_eq!(index.at(&addr).unwrap().name(), "start");
    }

    #[test]
    fn duplicate_name_at_other_address_is_conflict() {
        let mut index = LabelIndex::default();
        index
            .insert(Address::linear(0x1000, 32), Label::new("start", LabelKind::Code))
            .unwrap();
        let err = index
            .insert(Address::linear(0x2000, 32), Label::new("start", LabelKind::Code))
            .unwrap_err();
        assert!(matches!(err, DocumentError::Conflict));
    }

    #[test]
    fn rebinding_address_drops_old_name() {
        let mut index = LabelIndex::default();
        let addr = Address::linear(0x1000, 32);
        index
            .insert(addr, Label::new("old", LabelKind::Data))
            .unwrap();
        let previous = index
            .insert(addr, Label::new("new", LabelKind::Code))
            .unwrap();
        assert_eq!(previous.unwrap().name(), "old");
        assert_eq!(index.address_of("old"), None);
        assert_eq!(index.address_of("new"), Some(addr));
        assert_eq!(index.len(), 1);
    }
}
