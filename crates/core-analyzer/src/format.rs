//! Cell and multicell rendering for views.
//!
//! Instructions are delegated to the architecture that decoded them
//! (resolved through the registry by the cell's tag, with the generic
//! renderer as fallback); data cells are rendered here from the bytes
//! backing them. Every renderer returns the text plus highlight marks.

use std::fmt::Write as _;

use core_address::Address;
use core_document::{
    Cell, CellKind, Document, Mark, MarkKind, MultiCell, MultiCellKind, StringEncoding,
    ValueFormat,
};
use core_plugin::ModuleManager;
use core_plugin::format::render_instruction;

use crate::AnalyzerError;

fn append_comment(cell: &Cell, text: &mut String, marks: &mut Vec<Mark>) {
    if let Some(comment) = cell.comment() {
        let start = text.len() as u16;
        let _ = write!(text, " ; {comment}");
        marks.push(Mark::new(
            MarkKind::Comment,
            start,
            text.len() as u16 - start,
        ));
    }
}

fn push_directive(text: &mut String, marks: &mut Vec<Mark>, directive: &str) {
    text.push_str(directive);
    marks.push(Mark::new(MarkKind::Mnemonic, 0, directive.len() as u16));
    text.push(' ');
}

/// Render the cell at `address`. Bytes that cannot be read back from the
/// stream render as `??` rather than failing: a view must be able to
/// draw a document whose stream has holes.
pub fn format_cell(
    modules: &ModuleManager,
    document: &Document,
    address: &Address,
    cell: &Cell,
) -> Result<(String, Vec<Mark>), AnalyzerError> {
    let mut text = String::new();
    let mut marks = Vec::new();

    match cell.kind() {
        CellKind::Instruction(instruction) => {
            let (body, body_marks) = match modules.architecture(cell.arch_tag()) {
                Some(architecture) => {
                    architecture.format_instruction(document, address, instruction)
                }
                None => render_instruction(document, address, instruction),
            };
            text = body;
            marks = body_marks;
        }
        CellKind::Value { format } => {
            let directive = match cell.length() {
                2 => "dw",
                4 => "dd",
                8 => "dq",
                _ => "db",
            };
            push_directive(&mut text, &mut marks, directive);
            let start = text.len() as u16;
            match read_value(document, address, cell.length()) {
                Some(value) => {
                    let _ = match format {
                        ValueFormat::Hexadecimal => write!(text, "{value:#x}"),
                        ValueFormat::Decimal => write!(text, "{value}"),
                        ValueFormat::Binary => write!(text, "{value:#b}"),
                        ValueFormat::Character => {
                            write!(text, "{:?}", char::from(value as u8))
                        }
                    };
                }
                None => text.push_str("??"),
            }
            marks.push(Mark::new(
                MarkKind::Immediate,
                start,
                text.len() as u16 - start,
            ));
        }
        CellKind::Character { encoding } => {
            push_directive(&mut text, &mut marks, "db");
            let start = text.len() as u16;
            match read_string(document, address, cell.length(), *encoding) {
                Some(decoded) if !decoded.is_empty() => {
                    let _ = write!(text, "{:?}", decoded.chars().next().unwrap_or('?'));
                }
                _ => text.push_str("??"),
            }
            marks.push(Mark::new(
                MarkKind::String,
                start,
                text.len() as u16 - start,
            ));
        }
        CellKind::String { encoding } => {
            if *encoding == StringEncoding::Utf16 {
                text.push('L');
            }
            let start = text.len() as u16;
            match read_string(document, address, cell.length(), *encoding) {
                Some(decoded) => {
                    let _ = write!(text, "{decoded:?}");
                }
                None => text.push_str("\"??\""),
            }
            marks.push(Mark::new(
                MarkKind::String,
                start,
                text.len() as u16 - start,
            ));
        }
    }

    append_comment(cell, &mut text, &mut marks);
    Ok((text, marks))
}

/// Render a multicell banner line.
pub fn format_multi_cell(
    document: &Document,
    address: &Address,
    multicell: &MultiCell,
) -> Result<(String, Vec<Mark>), AnalyzerError> {
    let mut text = String::from("; ");
    let mut marks = Vec::new();
    match multicell.kind() {
        MultiCellKind::Function { blocks } => {
            text.push_str("function ");
            let name = document
                .label_at(address)
                .map(|label| label.name().to_string())
                .unwrap_or_else(|| format!("fcn_{:x}", address.offset()));
            let start = text.len() as u16;
            text.push_str(&name);
            marks.push(Mark::new(MarkKind::Label, start, name.len() as u16));
            let _ = write!(
                text,
                " ({} bytes, {} blocks)",
                multicell.size(),
                blocks.len()
            );
        }
        MultiCellKind::Array { element_size } => {
            let count = if *element_size == 0 {
                0
            } else {
                multicell.size() / u64::from(*element_size)
            };
            let _ = write!(text, "array {count} x {element_size} bytes");
        }
        MultiCellKind::Struct => {
            let _ = write!(text, "structure ({} bytes)", multicell.size());
        }
        MultiCellKind::StringRegion => {
            let _ = write!(text, "string ({} bytes)", multicell.size());
        }
    }
    marks.insert(0, Mark::new(MarkKind::Comment, 0, text.len() as u16));
    Ok((text, marks))
}

fn read_value(document: &Document, address: &Address, width: u16) -> Option<u64> {
    let stream = document.binary_stream()?;
    let offset = document.translate(address)?;
    match width {
        2 => stream.read_u16(offset).map(u64::from),
        4 => stream.read_u32(offset).map(u64::from),
        8 => stream.read_u64(offset),
        _ => stream.read_u8(offset).map(u64::from),
    }
}

fn read_string(
    document: &Document,
    address: &Address,
    length: u16,
    encoding: StringEncoding,
) -> Option<String> {
    let stream = document.binary_stream()?;
    let offset = document.translate(address)?;
    let bytes = stream.slice(offset, usize::from(length))?;
    let decoded = match encoding {
        StringEncoding::Ascii => bytes
            .iter()
            .take_while(|byte| **byte != 0)
            .map(|byte| char::from(*byte))
            .collect(),
        StringEncoding::Utf16 => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|unit| *unit != 0)
                .collect();
            String::from_utf16_lossy(&units)
        }
    };
    Some(decoded)
}
