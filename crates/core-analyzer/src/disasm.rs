//! Recursive-traversal disassembly of one function.

use std::collections::BTreeSet;

use core_address::Address;
use core_document::{
    ArchTag, Cell, Document, InstructionKind, ValueFormat, XRefKind,
};
use core_plugin::Architecture;
use tracing::{debug, trace};

/// Outcome of disassembling one function entry.
#[derive(Debug, Default)]
pub struct FunctionDisassembly {
    /// Call targets discovered in the body, each a candidate function
    /// entry for a follow-up pass.
    pub callees: Vec<Address>,
    /// Instruction cells written by this run (zero when the entry was
    /// already decoded — the pass is idempotent).
    pub decoded: usize,
}

/// Disassemble the function entered at `entry` into `document`.
///
/// Worklist traversal over the successor rules: sequential flow follows
/// the instruction length, jumps follow their explicit target, calls
/// record the callee and continue sequentially, returns stop the branch.
/// Branch and call targets land in the cross-reference graph as the
/// instructions naming them are decoded. A branch stops at the first
/// address that already holds an instruction, which is what makes
/// re-running the pass produce nothing new.
pub fn disassemble_function(
    document: &Document,
    architecture: &dyn Architecture,
    arch_tag: ArchTag,
    mode: u8,
    entry: Address,
) -> FunctionDisassembly {
    let mut result = FunctionDisassembly::default();
    let Some(stream) = document.binary_stream() else {
        debug!(target: "analyzer.disasm", %entry, "no binary stream bound");
        return result;
    };

    let mut worklist = vec![entry];
    let mut visited: BTreeSet<Address> = BTreeSet::new();
    while let Some(address) = worklist.pop() {
        if !visited.insert(address) {
            continue;
        }
        if document.has_instruction_at(&address) {
            continue;
        }
        let Some(offset) = document.translate(&address) else {
            trace!(target: "analyzer.disasm", %address, "address not mapped, branch ends");
            continue;
        };
        let Some(instruction) = architecture.disassemble(&stream, offset, mode) else {
            // Undecodable bytes become a one-byte value so the gap is
            // claimed and the branch ends.
            let _ = document.set_cell(address, Cell::value(1, ValueFormat::Hexadecimal), false);
            debug!(target: "analyzer.disasm", %address, "decode failed, marked as data");
            continue;
        };

        let length = u64::from(instruction.length());
        let kind = instruction.kind();
        let target = instruction.target_from(&address);
        if document
            .set_cell(address, Cell::instruction(instruction, arch_tag, mode), false)
            .is_err()
        {
            // Collided with existing content (data cell, concurrent
            // writer); treat like a decode boundary.
            trace!(target: "analyzer.disasm", %address, "cell conflict, branch ends");
            continue;
        }
        result.decoded += 1;

        let fallthrough = address.add_offset(length);
        match kind {
            InstructionKind::Normal => {
                if let Some(next) = fallthrough {
                    worklist.push(next);
                }
            }
            InstructionKind::Jump => {
                if let Some(target) = target {
                    document.add_cross_reference(address, target, XRefKind::Branch);
                    worklist.push(target);
                }
            }
            InstructionKind::ConditionalJump => {
                if let Some(target) = target {
                    document.add_cross_reference(address, target, XRefKind::Branch);
                    worklist.push(target);
                }
                if let Some(next) = fallthrough {
                    worklist.push(next);
                }
            }
            InstructionKind::Call => {
                if let Some(target) = target {
                    document.add_cross_reference(address, target, XRefKind::Call);
                    result.callees.push(target);
                }
                if let Some(next) = fallthrough {
                    worklist.push(next);
                }
            }
            InstructionKind::Return => {}
        }
    }

    debug!(
        target: "analyzer.disasm",
        %entry,
        decoded = result.decoded,
        callees = result.callees.len(),
        "function pass complete"
    );
    result
}
