//! Built-in providers: the raw loader and the in-memory database.
//!
//! These are the providers every installation has even with an empty
//! module directory, mirroring what the probe pass in
//! [`crate::ModuleManager::load_modules`] hands out.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use core_address::Address;
use core_binary::BinaryStream;
use core_document::{
    ArchTag, AreaAccess, Cell, Database, Document, DocumentDump, Label, LabelKind, MemoryArea,
    MultiCell, XRefKind,
};
use tracing::info;

use crate::providers::{DatabaseFactory, Loader};

/// All bundled loaders, in probe order.
pub fn loaders() -> Vec<Arc<dyn Loader>> {
    vec![Arc::new(RawLoader)]
}

/// All bundled database factories.
pub fn databases() -> Vec<Arc<dyn DatabaseFactory>> {
    vec![Arc::new(MemoryDatabaseFactory)]
}

/// Maps any stream as one flat readable+executable region at address 0
/// with a `start` label on the first byte. The fallback when no format
/// loader recognizes the container.
pub struct RawLoader;

impl Loader for RawLoader {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn can_load(&self, _stream: &BinaryStream) -> bool {
        true
    }

    fn map(&self, document: &Document) -> anyhow::Result<()> {
        let stream = document
            .binary_stream()
            .context("raw loader needs a bound binary stream")?;
        if stream.is_empty() {
            bail!("raw loader cannot map an empty stream");
        }
        let bit_size = if stream.len() as u64 > u64::from(u32::MAX) {
            64
        } else {
            32
        };
        let start = Address::linear(0, bit_size);
        document
            .add_memory_area(MemoryArea::new(
                "flat",
                start,
                stream.len() as u64,
                AreaAccess::READ | AreaAccess::EXECUTE,
                0,
                ArchTag::UNKNOWN,
                0,
            ))
            .map_err(|error| anyhow::anyhow!("raw mapping: {error}"))?;
        document
            .add_label(start, Label::new("start", LabelKind::Code))
            .map_err(|error| anyhow::anyhow!("raw entry label: {error}"))?;
        info!(target: "core.plugin", size = stream.len(), "raw loader mapped stream");
        Ok(())
    }
}

/// RAM-only persistence: entities live in maps inside the instance, and
/// `create`/`open`/`close` only manage the association with a path. The
/// round-trip guarantee holds for the lifetime of the instance, which is
/// exactly the lifetime of the document owning it.
#[derive(Default)]
pub struct MemoryDatabase {
    path: Option<PathBuf>,
    stream: Option<Arc<BinaryStream>>,
    areas: BTreeMap<Address, MemoryArea>,
    cells: BTreeMap<Address, Cell>,
    multicells: BTreeMap<Address, MultiCell>,
    labels: BTreeMap<Address, Label>,
    xrefs: BTreeSet<(Address, Address, XRefKind)>,
    comments: BTreeMap<Address, String>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn extension(&self) -> &'static str {
        ".gmd"
    }

    fn create(&mut self, path: &Path, overwrite: bool) -> anyhow::Result<()> {
        if path.exists() && !overwrite {
            bail!("database {} already exists", path.display());
        }
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn open(&mut self, path: &Path) -> anyhow::Result<()> {
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_binary_stream(&mut self, stream: Arc<BinaryStream>) {
        self.stream = Some(stream);
    }

    fn binary_stream(&self) -> Option<Arc<BinaryStream>> {
        self.stream.clone()
    }

    fn store_memory_area(&mut self, area: &MemoryArea) -> anyhow::Result<()> {
        self.areas.insert(area.start(), area.clone());
        Ok(())
    }

    fn store_cell(&mut self, address: &Address, cell: &Cell) -> anyhow::Result<()> {
        self.cells.insert(*address, cell.clone());
        Ok(())
    }

    fn remove_cell(&mut self, address: &Address) -> anyhow::Result<()> {
        self.cells.remove(address);
        Ok(())
    }

    fn store_multicell(&mut self, address: &Address, multicell: &MultiCell) -> anyhow::Result<()> {
        self.multicells.insert(*address, multicell.clone());
        Ok(())
    }

    fn remove_multicell(&mut self, address: &Address) -> anyhow::Result<()> {
        self.multicells.remove(address);
        Ok(())
    }

    fn store_label(&mut self, address: &Address, label: &Label) -> anyhow::Result<()> {
        self.labels.insert(*address, label.clone());
        Ok(())
    }

    fn remove_label(&mut self, address: &Address) -> anyhow::Result<()> {
        self.labels.remove(address);
        Ok(())
    }

    fn store_cross_reference(
        &mut self,
        from: &Address,
        to: &Address,
        kind: XRefKind,
    ) -> anyhow::Result<()> {
        self.xrefs.insert((*from, *to, kind));
        Ok(())
    }

    fn store_comment(&mut self, address: &Address, text: &str) -> anyhow::Result<()> {
        self.comments.insert(*address, text.to_string());
        Ok(())
    }

    fn load(&mut self) -> anyhow::Result<DocumentDump> {
        Ok(DocumentDump {
            areas: self.areas.values().cloned().collect(),
            cells: self
                .cells
                .iter()
                .map(|(address, cell)| (*address, cell.clone()))
                .collect(),
            multicells: self
                .multicells
                .iter()
                .map(|(address, mc)| (*address, mc.clone()))
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(address, label)| (*address, label.clone()))
                .collect(),
            xrefs: self.xrefs.iter().copied().collect(),
            comments: self
                .comments
                .iter()
                .map(|(address, text)| (*address, text.clone()))
                .collect(),
        })
    }
}

/// Factory the registry hands out for [`MemoryDatabase`].
pub struct MemoryDatabaseFactory;

impl DatabaseFactory for MemoryDatabaseFactory {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn extension(&self) -> &'static str {
        ".gmd"
    }

    fn build(&self) -> Box<dyn Database> {
        Box::new(MemoryDatabase::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_document::ValueFormat;

    #[test]
    fn raw_loader_maps_whole_stream() {
        let document = Document::new();
        document.set_binary_stream(Arc::new(BinaryStream::from_bytes(&[0x90; 64])));
        RawLoader.map(&document).unwrap();

        let areas = document.memory_areas();
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].size(), 64);
        assert!(areas[0].access().contains(AreaAccess::EXECUTE));
        assert_eq!(
            document.address_of_label("start"),
            Some(Address::linear(0, 32))
        );
        assert_eq!(document.translate(&Address::linear(0x10, 32)), Some(0x10));
    }

    #[test]
    fn raw_loader_rejects_empty_stream() {
        let document = Document::new();
        document.set_binary_stream(Arc::new(BinaryStream::from_bytes(&[])));
        assert!(RawLoader.map(&document).is_err());
    }

    #[test]
    fn memory_database_round_trips_through_close_and_open() {
        let mut db = MemoryDatabase::new();
        let addr = Address::linear(0x100, 32);
        let area = MemoryArea::new(
            ".text",
            addr,
            0x40,
            AreaAccess::READ,
            0,
            ArchTag::UNKNOWN,
            0,
        );
        db.create(Path::new("session.gmd"), true).unwrap();
        db.store_memory_area(&area).unwrap();
        db.store_cell(&addr, &Cell::value(4, ValueFormat::Hexadecimal))
            .unwrap();
        db.store_multicell(&addr, &MultiCell::string_region(8))
            .unwrap();
        db.store_label(&addr, &Label::new("start", LabelKind::Code))
            .unwrap();
        db.store_cross_reference(&addr, &Address::linear(0x104, 32), XRefKind::Branch)
            .unwrap();
        db.store_comment(&addr, "entry").unwrap();

        db.close().unwrap();
        db.open(Path::new("session.gmd")).unwrap();

        let dump = db.load().unwrap();
        assert_eq!(dump.areas, vec![area]);
        assert_eq!(dump.cells.len(), 1);
        assert_eq!(dump.multicells.len(), 1);
        assert_eq!(dump.labels[0].1.name(), "start");
        assert_eq!(
            dump.xrefs,
            vec![(addr, Address::linear(0x104, 32), XRefKind::Branch)]
        );
        assert_eq!(dump.comments[0].1, "entry");
    }

    #[test]
    fn create_refuses_existing_path_without_overwrite() {
        let dir = std::env::temp_dir();
        let path = dir.join("gorgon-existing-db-test.gmd");
        std::fs::write(&path, b"occupied").unwrap();
        let mut db = MemoryDatabase::new();
        assert!(db.create(&path, false).is_err());
        assert!(db.create(&path, true).is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
