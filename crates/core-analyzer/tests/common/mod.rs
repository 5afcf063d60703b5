#![allow(dead_code)] // Shared across the integration test binaries; each uses a subset.

use std::sync::Arc;

use core_address::Address;
use core_analyzer::Analyzer;
use core_binary::{BinaryStream, Endianness};
use core_document::{
    ArchTag, AreaAccess, Document, Instruction, InstructionKind, MemoryArea, Operand, Semantic,
};
use core_plugin::{Architecture, ModuleManager};

/// Virtual address the test code area is mapped at.
pub const CODE_BASE: u64 = 0x100;

pub fn addr(offset: u64) -> Address {
    Address::linear(offset, 32)
}

/// A minimal byte-coded ISA exercising every control-flow class:
///
/// | encoding      | mnemonic      | kind            |
/// |---------------|---------------|-----------------|
/// | `00`          | `ret`         | Return          |
/// | `90`          | `nop`         | Normal          |
/// | `B0 rr ii`    | `mov rN, imm` | Normal          |
/// | `EB dd`       | `jmp rel8`    | Jump            |
/// | `75 dd`       | `jnz rel8`    | ConditionalJump |
/// | `E8 dd`       | `call rel8`   | Call            |
///
/// Relative displacements count from the end of the instruction.
pub struct ToyArch;

fn relative(
    stream: &BinaryStream,
    offset: u64,
    opcode: u8,
    mnemonic: &str,
    kind: InstructionKind,
) -> Option<Instruction> {
    let displacement = stream.read_i8(offset + 1)?;
    Some(
        Instruction::new(u16::from(opcode), mnemonic, kind, 2)
            .with_operands(vec![Operand::Relative(i64::from(displacement))]),
    )
}

impl Architecture for ToyArch {
    fn name(&self) -> &'static str {
        "toy"
    }

    fn endianness(&self) -> Endianness {
        Endianness::Little
    }

    fn default_mode(&self, _address: &Address) -> u8 {
        0
    }

    fn disassemble(&self, stream: &BinaryStream, offset: u64, _mode: u8) -> Option<Instruction> {
        let opcode = stream.read_u8(offset)?;
        match opcode {
            0x00 => Some(
                Instruction::new(0x00, "ret", InstructionKind::Return, 1)
                    .with_semantics(vec![Semantic::Return]),
            ),
            0x90 => Some(Instruction::new(0x90, "nop", InstructionKind::Normal, 1)),
            0xB0 => {
                let register = Operand::Register(format!("r{}", stream.read_u8(offset + 1)?));
                let immediate = Operand::Immediate(u64::from(stream.read_u8(offset + 2)?));
                Some(
                    Instruction::new(0xB0, "mov", InstructionKind::Normal, 3)
                        .with_operands(vec![register.clone(), immediate.clone()])
                        .with_semantics(vec![Semantic::Assign {
                            destination: register,
                            source: immediate,
                        }]),
                )
            }
            0xEB => relative(stream, offset, 0xEB, "jmp", InstructionKind::Jump),
            0x75 => relative(stream, offset, 0x75, "jnz", InstructionKind::ConditionalJump),
            0xE8 => relative(stream, offset, 0xE8, "call", InstructionKind::Call),
            _ => None,
        }
    }
}

pub struct Fixture {
    pub document: Arc<Document>,
    pub modules: Arc<ModuleManager>,
    pub architecture: Arc<dyn Architecture>,
    pub analyzer: Analyzer,
}

/// A document with `code` mapped read+execute at [`CODE_BASE`] and a
/// registered [`ToyArch`].
pub fn fixture(code: &[u8]) -> Fixture {
    let mut stream = BinaryStream::from_bytes(code);
    stream.set_endianness(Endianness::Little);
    let document = Arc::new(Document::new());
    document.set_binary_stream(Arc::new(stream));
    document
        .add_memory_area(MemoryArea::new(
            ".text",
            addr(CODE_BASE),
            code.len() as u64,
            AreaAccess::READ | AreaAccess::EXECUTE,
            0,
            ArchTag::UNKNOWN,
            0,
        ))
        .expect("mapping the test area");

    let mut modules = ModuleManager::new();
    let architecture: Arc<dyn Architecture> = Arc::new(ToyArch);
    modules.register_architecture(Arc::clone(&architecture));
    let modules = Arc::new(modules);

    Fixture {
        document,
        analyzer: Analyzer::new(Arc::clone(&modules)),
        modules,
        architecture,
    }
}
