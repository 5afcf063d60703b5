//! Persistence contract.
//!
//! The document mirrors every committed write into its database handle;
//! the database owns the on-disk (or in-RAM) representation and promises
//! only the round trip: everything stored before `close` is returned by
//! `load` after a subsequent `open`. Formats are opaque to the core.
//!
//! Fallible operations return `anyhow::Result` so back-ends can attach
//! whatever context their storage layer produces; failures during
//! analysis mirroring are logged and do not abort the pass, while
//! failures during `create`/`open` propagate to the caller.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use core_address::Address;
use core_binary::BinaryStream;

use crate::cell::Cell;
use crate::label::Label;
use crate::memory::MemoryArea;
use crate::multicell::MultiCell;
use crate::xref::XRefKind;

/// Full read-back of a persisted document.
#[derive(Debug, Default, Clone)]
pub struct DocumentDump {
    pub areas: Vec<MemoryArea>,
    pub cells: Vec<(Address, Cell)>,
    pub multicells: Vec<(Address, MultiCell)>,
    pub labels: Vec<(Address, Label)>,
    pub xrefs: Vec<(Address, Address, XRefKind)>,
    pub comments: Vec<(Address, String)>,
}

/// Storage back-end for a document.
pub trait Database: Send {
    fn name(&self) -> &'static str;

    /// File extension (with dot) the back-end uses for its containers.
    fn extension(&self) -> &'static str;

    fn create(&mut self, path: &Path, overwrite: bool) -> Result<()>;

    fn open(&mut self, path: &Path) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn set_binary_stream(&mut self, stream: Arc<BinaryStream>);

    fn binary_stream(&self) -> Option<Arc<BinaryStream>>;

    fn store_memory_area(&mut self, area: &MemoryArea) -> Result<()>;

    fn store_cell(&mut self, address: &Address, cell: &Cell) -> Result<()>;

    fn remove_cell(&mut self, address: &Address) -> Result<()>;

    fn store_multicell(&mut self, address: &Address, multicell: &MultiCell) -> Result<()>;

    fn remove_multicell(&mut self, address: &Address) -> Result<()>;

    fn store_label(&mut self, address: &Address, label: &Label) -> Result<()>;

    fn remove_label(&mut self, address: &Address) -> Result<()>;

    fn store_cross_reference(&mut self, from: &Address, to: &Address, kind: XRefKind)
    -> Result<()>;

    fn store_comment(&mut self, address: &Address, text: &str) -> Result<()>;

    /// Read everything back. Called once when a document re-attaches to a
    /// previously populated database.
    fn load(&mut self) -> Result<DocumentDump>;
}
