//! Generic instruction rendering with highlight marks.

use std::fmt::Write as _;

use core_address::Address;
use core_document::{Document, Instruction, Mark, MarkKind, Operand};

/// Render `mnemonic op, op` syntax, substituting document labels for
/// resolved targets (relative displacements resolve against `address`,
/// the instruction's own location). Returns the text plus one mark per
/// highlighted span; mark offsets are byte offsets into the returned
/// string.
pub fn render_instruction(
    document: &Document,
    address: &Address,
    instruction: &Instruction,
) -> (String, Vec<Mark>) {
    let mut text = String::new();
    let mut marks = Vec::new();

    text.push_str(instruction.mnemonic());
    marks.push(Mark::new(MarkKind::Mnemonic, 0, text.len() as u16));

    for (index, operand) in instruction.operands().iter().enumerate() {
        text.push_str(if index == 0 { " " } else { ", " });
        let start = text.len() as u16;
        let kind = match operand {
            Operand::Register(name) => {
                text.push_str(name);
                MarkKind::Register
            }
            Operand::Immediate(value) => {
                let _ = write!(text, "{value:#x}");
                MarkKind::Immediate
            }
            Operand::Memory { base, displacement } => {
                text.push('[');
                if let Some(base) = base {
                    text.push_str(base);
                    if *displacement != 0 {
                        let _ = write!(text, "{displacement:+#x}");
                    }
                } else {
                    let _ = write!(text, "{displacement:#x}");
                }
                text.push(']');
                MarkKind::Immediate
            }
            Operand::Target(target) => {
                push_target(document, &mut text, Some(*target));
                MarkKind::Label
            }
            Operand::Relative(_) => {
                push_target(document, &mut text, instruction.target_from(address));
                MarkKind::Label
            }
        };
        marks.push(Mark::new(kind, start, text.len() as u16 - start));
    }

    (text, marks)
}

fn push_target(document: &Document, text: &mut String, target: Option<Address>) {
    match target {
        Some(target) => match document.label_at(&target) {
            Some(label) => text.push_str(label.name()),
            None => {
                let _ = write!(text, "{target}");
            }
        },
        None => text.push('?'),
    }
}
