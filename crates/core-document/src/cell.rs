//! Cells: the atomic analyzed unit at a single address.
//!
//! A cell is a tagged sum with a common header. The header carries what
//! every view and pass needs regardless of variant (byte length, the
//! architecture that decoded it, the decoding mode, an optional comment);
//! the payload distinguishes raw values, text units, strings, and decoded
//! instructions. External holders receive clones; the authoritative copy
//! lives in the document's cell store.

use core_address::Address;

/// Stable index of a registered architecture, assigned at registration.
/// Tag 0 is reserved for "unknown" (cells created before any architecture
/// touched them, e.g. raw data from the string finder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchTag(u16);

impl ArchTag {
    pub const UNKNOWN: ArchTag = ArchTag(0);

    pub fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u16 {
        self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == 0
    }
}

/// Rendering hint for raw value cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueFormat {
    #[default]
    Hexadecimal,
    Decimal,
    Binary,
    Character,
}

/// Text encoding of character and string cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Ascii,
    Utf16,
}

/// One decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Register(String),
    Immediate(u64),
    /// A memory reference through an optional base register.
    Memory {
        base: Option<String>,
        displacement: i64,
    },
    /// An explicit code or data target, already resolved to an address.
    Target(Address),
    /// A displacement from the end of the instruction, resolved against
    /// the instruction's own address (`rel8`/`rel32`-style branches).
    Relative(i64),
}

/// A decoded side effect, in a deliberately small assignment language.
/// Architectures that do not model semantics leave the list empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Semantic {
    Assign {
        destination: Operand,
        source: Operand,
    },
    Transfer(Operand),
    Return,
}

/// Control-flow class of an instruction, driving successor computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    Normal,
    Jump,
    ConditionalJump,
    Call,
    Return,
}

impl InstructionKind {
    /// Whether execution can continue at the next sequential address.
    pub fn has_fallthrough(self) -> bool {
        matches!(
            self,
            InstructionKind::Normal | InstructionKind::ConditionalJump | InstructionKind::Call
        )
    }

    /// Whether this instruction ends a basic block.
    pub fn ends_block(self) -> bool {
        !matches!(self, InstructionKind::Normal)
    }
}

/// A decoded machine instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: u16,
    mnemonic: String,
    kind: InstructionKind,
    length: u16,
    operands: Vec<Operand>,
    semantics: Vec<Semantic>,
}

impl Instruction {
    pub fn new(opcode: u16, mnemonic: impl Into<String>, kind: InstructionKind, length: u16) -> Self {
        Self {
            opcode,
            mnemonic: mnemonic.into(),
            kind,
            length,
            operands: Vec::new(),
            semantics: Vec::new(),
        }
    }

    pub fn with_operands(mut self, operands: Vec<Operand>) -> Self {
        self.operands = operands;
        self
    }

    pub fn with_semantics(mut self, semantics: Vec<Semantic>) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn kind(&self) -> InstructionKind {
        self.kind
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn semantics(&self) -> &[Semantic] {
        &self.semantics
    }

    /// The explicit control-flow target, when the instruction has one.
    /// Relative operands need the instruction's address; see
    /// [`Instruction::target_from`].
    pub fn target(&self) -> Option<Address> {
        self.operands.iter().find_map(|operand| match operand {
            Operand::Target(address) => Some(*address),
            _ => None,
        })
    }

    /// The control-flow target with relative displacements resolved
    /// against `address`, the instruction's own location.
    pub fn target_from(&self, address: &Address) -> Option<Address> {
        self.operands.iter().find_map(|operand| match operand {
            Operand::Target(target) => Some(*target),
            Operand::Relative(displacement) => {
                let next = address.add_offset(u64::from(self.length))?;
                if *displacement >= 0 {
                    next.add_offset(*displacement as u64)
                } else {
                    next.sub_offset(displacement.unsigned_abs())
                }
            }
            _ => None,
        })
    }
}

/// Variant payload of a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    /// Raw data of width 1/2/4/8 with a formatting hint.
    Value { format: ValueFormat },
    /// A single encoded text unit.
    Character { encoding: StringEncoding },
    /// A length-carrying string; the length lives in the header.
    String { encoding: StringEncoding },
    Instruction(Instruction),
}

/// The atomic analyzed unit at one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    kind: CellKind,
    length: u16,
    arch_tag: ArchTag,
    mode: u8,
    comment: Option<String>,
}

impl Cell {
    /// A raw value cell of the given byte width (1, 2, 4 or 8).
    pub fn value(width: u16, format: ValueFormat) -> Self {
        debug_assert!(matches!(width, 1 | 2 | 4 | 8));
        Self {
            kind: CellKind::Value { format },
            length: width,
            arch_tag: ArchTag::UNKNOWN,
            mode: 0,
            comment: None,
        }
    }

    pub fn character(encoding: StringEncoding) -> Self {
        let length = match encoding {
            StringEncoding::Ascii => 1,
            StringEncoding::Utf16 => 2,
        };
        Self {
            kind: CellKind::Character { encoding },
            length,
            arch_tag: ArchTag::UNKNOWN,
            mode: 0,
            comment: None,
        }
    }

    pub fn string(length: u16, encoding: StringEncoding) -> Self {
        Self {
            kind: CellKind::String { encoding },
            length,
            arch_tag: ArchTag::UNKNOWN,
            mode: 0,
            comment: None,
        }
    }

    pub fn instruction(instruction: Instruction, arch_tag: ArchTag, mode: u8) -> Self {
        let length = instruction.length();
        Self {
            kind: CellKind::Instruction(instruction),
            length,
            arch_tag,
            mode,
            comment: None,
        }
    }

    /// Override the header's architecture tag and mode.
    pub fn with_arch(mut self, arch_tag: ArchTag, mode: u8) -> Self {
        self.arch_tag = arch_tag;
        self.mode = mode;
        self
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn arch_tag(&self) -> ArchTag {
        self.arch_tag
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self.kind, CellKind::Instruction(_))
    }

    pub fn as_instruction(&self) -> Option<&Instruction> {
        match &self.kind {
            CellKind::Instruction(instruction) => Some(instruction),
            _ => None,
        }
    }
}

/// Highlight classes attached to a formatted cell rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkKind {
    Mnemonic,
    Register,
    Immediate,
    Label,
    Comment,
    String,
}

/// A byte range of a formatted string tagged for view highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pub kind: MarkKind,
    pub offset: u16,
    pub length: u16,
}

impl Mark {
    pub fn new(kind: MarkKind, offset: u16, length: u16) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }
}
