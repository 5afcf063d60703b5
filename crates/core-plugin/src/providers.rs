//! The four provider trait families.

use std::sync::Arc;

use core_address::Address;
use core_binary::{BinaryStream, Endianness};
use core_config::{Configuration, ConfigurationModel};
use core_document::{Database, Document, Instruction, Mark};

use crate::format::render_instruction;

/// An instruction-set back-end.
///
/// The disassembler is pure with respect to the stream: no state is
/// carried between calls, so any number of workers may disassemble
/// through the same architecture concurrently. Implementations that need
/// configuration state own their interior mutability; `use_configuration`
/// is called before analysis starts.
pub trait Architecture: Send + Sync {
    fn name(&self) -> &'static str;

    /// Byte order the engine applies to the binary stream at start.
    fn endianness(&self) -> Endianness;

    /// Decoding mode for an address no cell has constrained yet.
    fn default_mode(&self, address: &Address) -> u8;

    /// Decode one instruction at `offset`. `None` means the bytes do not
    /// form a valid instruction; the caller falls back to data.
    fn disassemble(&self, stream: &BinaryStream, offset: u64, mode: u8) -> Option<Instruction>;

    /// Render an instruction with highlight marks. The default produces
    /// generic `mnemonic op, op` syntax with labels substituted from the
    /// document; override for architecture-specific syntax.
    fn format_instruction(
        &self,
        document: &Document,
        address: &Address,
        instruction: &Instruction,
    ) -> (String, Vec<Mark>) {
        render_instruction(document, address, instruction)
    }

    fn fill_configuration_model(&self, _model: &mut ConfigurationModel) {}

    fn use_configuration(&self, _configuration: &Configuration) {}
}

/// A container-format back-end.
pub trait Loader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this loader recognizes the container in `stream`. Called
    /// with the probe stream during module loading.
    fn can_load(&self, stream: &BinaryStream) -> bool;

    /// Populate the document's memory map and initial labels (entry
    /// point, imports, exports) from its attached stream.
    fn map(&self, document: &Document) -> anyhow::Result<()>;

    /// The architecture this container targets, when the format states
    /// one. `None` leaves the choice to the caller.
    fn main_architecture(
        &self,
        _available: &[Arc<dyn Architecture>],
    ) -> Option<Arc<dyn Architecture>> {
        None
    }

    fn fill_configuration_model(&self, _model: &mut ConfigurationModel) {}

    fn configure(&self, _configuration: &Configuration) {}
}

/// Platform-specific analysis hooks.
pub trait OperatingSystem: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this OS layer applies to the given loader/architecture
    /// pairing.
    fn supports(&self, loader: &dyn Loader, architecture: &dyn Architecture) -> bool;

    /// Invoked after a function multicell is created at `entry`
    /// (calling-convention recovery, syscall annotation, ...).
    fn analyze_function(&self, _document: &Document, _entry: Address) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Produces database back-ends. Databases are singly owned by the
/// document, so the registry hands out factories rather than instances.
pub trait DatabaseFactory: Send + Sync {
    fn name(&self) -> &'static str;

    /// File extension (with dot) of containers this back-end produces.
    fn extension(&self) -> &'static str;

    fn build(&self) -> Box<dyn Database>;
}
