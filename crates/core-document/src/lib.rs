//! The analyzed-document model: memory map, cells, multicells, labels,
//! cross-references, comments, and the lock-guarded [`Document`]
//! aggregate that ties them to a binary stream and a database handle.
//!
//! Everything here is data plus invariants; the passes that populate a
//! document live in `core-analyzer`, and the providers that feed it in
//! `core-plugin`.

use thiserror::Error;

pub mod cell;
pub mod database;
pub mod document;
pub mod label;
pub mod memory;
pub mod multicell;
pub mod xref;

pub use cell::{
    ArchTag, Cell, CellKind, Instruction, InstructionKind, Mark, MarkKind, Operand, Semantic,
    StringEncoding, ValueFormat,
};
pub use database::{Database, DocumentDump};
pub use document::{Document, DocumentStats, SubscriptionId};
pub use label::{Label, LabelIndex, LabelKind};
pub use memory::{AreaAccess, MemoryArea, MemoryMap};
pub use multicell::{MultiCell, MultiCellKind};
pub use xref::{XRefGraph, XRefKind};

/// Write-side rejections. The document is unchanged whenever one of
/// these is returned; read-side misses surface as `None`, not errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DocumentError {
    #[error("memory area overlaps an existing area")]
    Overlap,
    #[error("write would overlap existing content")]
    Conflict,
    #[error("address is not mapped")]
    NotFound,
    #[error("content extends past the end of its memory area")]
    OutOfRange,
}
