//! String discovery over unclaimed bytes.
//!
//! Walks every mapped area, computes the gaps not covered by existing
//! cells, and scans each gap for ASCII and UTF-16LE runs of at least the
//! configured length, terminated by NUL or the first non-printable
//! unit. Each hit claims a string cell, a string-region multicell, and a
//! `str_<offset>` data label.

use core_document::{Cell, Document, Label, LabelKind, MultiCell, StringEncoding};
use tracing::debug;

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte) || byte == b'\t'
}

/// An accepted run inside a scanned slice.
struct Run {
    /// Offset of the first byte relative to the slice.
    start: usize,
    /// Claimed bytes including the NUL terminator when present.
    claimed: usize,
    encoding: StringEncoding,
}

/// Longest ASCII run starting exactly at `at`, or `None` when the run is
/// shorter than `min_units`.
fn ascii_run_at(bytes: &[u8], at: usize, min_units: usize) -> Option<Run> {
    let mut end = at;
    while end < bytes.len() && is_printable(bytes[end]) {
        end += 1;
    }
    let length = end - at;
    if length < min_units {
        return None;
    }
    let terminated = end < bytes.len() && bytes[end] == 0;
    Some(Run {
        start: at,
        claimed: length + usize::from(terminated),
        encoding: StringEncoding::Ascii,
    })
}

/// Longest UTF-16LE run (printable ASCII code units) starting at `at`.
fn utf16_run_at(bytes: &[u8], at: usize, min_units: usize) -> Option<Run> {
    let mut units = 0;
    let mut cursor = at;
    while cursor + 1 < bytes.len() && is_printable(bytes[cursor]) && bytes[cursor + 1] == 0 {
        units += 1;
        cursor += 2;
    }
    if units < min_units {
        return None;
    }
    let terminated = cursor + 1 < bytes.len() && bytes[cursor] == 0 && bytes[cursor + 1] == 0;
    Some(Run {
        start: at,
        claimed: units * 2 + 2 * usize::from(terminated),
        encoding: StringEncoding::Utf16,
    })
}

/// Scan one gap slice; UTF-16 is probed first since an alternating
/// zero pattern never qualifies as an ASCII run of useful length.
fn runs_in(bytes: &[u8], min_units: usize) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut at = 0;
    while at < bytes.len() {
        if let Some(run) = utf16_run_at(bytes, at, min_units)
            .or_else(|| ascii_run_at(bytes, at, min_units))
        {
            at = run.start + run.claimed;
            runs.push(run);
        } else {
            at += 1;
        }
    }
    runs
}

/// Find and claim strings across the whole document. Returns the number
/// of strings written.
pub fn find_strings(document: &Document, min_units: usize) -> usize {
    let Some(stream) = document.binary_stream() else {
        return 0;
    };
    let mut found = 0;

    for area in document.memory_areas() {
        let area_start = area.start();
        let area_end = area.end_offset();

        // Gaps between claimed cells, as (offset, length) pairs.
        let mut gaps = Vec::new();
        let mut cursor = area_start.offset();
        for (address, length) in document.cell_spans(&area_start, area_end) {
            if address.offset() > cursor {
                gaps.push((cursor, address.offset() - cursor));
            }
            cursor = cursor.max(address.offset().saturating_add(u64::from(length)));
        }
        if cursor < area_end {
            gaps.push((cursor, area_end - cursor));
        }

        for (gap_offset, gap_length) in gaps {
            let gap_address = area_start.with_offset(gap_offset);
            let Some(backing) = area.translate(&gap_address) else {
                continue;
            };
            let Some(bytes) = stream.slice(backing, gap_length as usize) else {
                continue;
            };
            for run in runs_in(bytes, min_units) {
                if run.claimed > usize::from(u16::MAX) {
                    continue;
                }
                let address = gap_address.with_offset(gap_offset + run.start as u64);
                let cell = Cell::string(run.claimed as u16, run.encoding);
                if document.set_cell(address, cell, false).is_err() {
                    continue;
                }
                let _ = document.set_multi_cell(
                    address,
                    MultiCell::string_region(run.claimed as u64),
                    false,
                );
                let name = format!("str_{:x}", address.offset());
                if document.address_of_label(&name).is_none() {
                    let _ = document.add_label(address, Label::new(name, LabelKind::Data));
                }
                found += 1;
            }
        }
    }

    debug!(target: "analyzer.strings", found, "string scan complete");
    found
}
