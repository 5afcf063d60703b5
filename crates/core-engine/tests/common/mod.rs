#![allow(dead_code)] // Shared across the integration test binaries; each uses a subset.

use std::sync::Arc;

use core_address::Address;
use core_binary::{BinaryStream, Endianness};
use core_config::Settings;
use core_document::{Instruction, InstructionKind, Operand};
use core_engine::Engine;
use core_plugin::{Architecture, MemoryDatabase, ModuleManager, RawLoader};

pub fn addr(offset: u64) -> Address {
    Address::linear(offset, 32)
}

/// Same toy ISA the analyzer tests use: `00` ret, `90` nop,
/// `B0 rr ii` mov, `EB dd` jmp, `75 dd` jnz, `E8 dd` call.
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
            0x00 => Some(Instruction::new(0x00, "ret", InstructionKind::Return, 1)),
            0x90 => Some(Instruction::new(0x90, "nop", InstructionKind::Normal, 1)),
            0xB0 => {
                let register = Operand::Register(format!("r{}", stream.read_u8(offset + 1)?));
                let immediate = Operand::Immediate(u64::from(stream.read_u8(offset + 2)?));
                Some(
                    Instruction::new(0xB0, "mov", InstructionKind::Normal, 3)
                        .with_operands(vec![register, immediate]),
                )
            }
            0xEB => relative(stream, offset, 0xEB, "jmp", InstructionKind::Jump),
            0x75 => relative(stream, offset, 0x75, "jnz", InstructionKind::ConditionalJump),
            0xE8 => relative(stream, offset, 0xE8, "call", InstructionKind::Call),
            _ => None,
        }
    }
}

pub struct Session {
    pub engine: Engine,
    pub architecture: Arc<dyn Architecture>,
}

/// A full session over `image`: toy architecture, raw loader (flat map
/// at 0 with a `start` label), in-memory database.
pub fn start_session(image: &[u8]) -> Session {
    let mut modules = ModuleManager::new();
    let architecture: Arc<dyn Architecture> = Arc::new(ToyArch);
    modules.register_architecture(Arc::clone(&architecture));
    let mut engine = Engine::new(Arc::new(modules), &Settings::default());
    engine
        .start(
            BinaryStream::from_bytes(image),
            Arc::new(RawLoader),
            Some(Arc::clone(&architecture)),
            None,
            Box::new(MemoryDatabase::new()),
        )
        .expect("starting the session");
    Session {
        engine,
        architecture,
    }
}
