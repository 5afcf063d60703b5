//! Operand tracking: callback-driven traversal of control flow.
//!
//! A [`Tracker`] closes over whatever state it accumulates (a register
//! of interest, an instruction budget, collected expressions); the
//! analyzer owns the frontier and the visited set, offering each address
//! exactly once per session. Returning `false` from
//! [`Tracker::track`] ends the session.

use std::collections::{BTreeSet, VecDeque};

use core_address::Address;
use core_document::{Document, XRefKind};

use crate::Analyzer;

/// Per-session traversal callback.
pub trait Tracker {
    /// Inspect `address`. Return `true` to keep the session alive.
    fn track(&mut self, analyzer: &Analyzer, document: &Document, address: Address) -> bool;
}

/// Control-flow successors of the instruction at `address`: the
/// fall-through when the kind has one, plus recorded branch targets.
fn successors(document: &Document, address: &Address) -> Vec<Address> {
    let mut next = Vec::new();
    if let Some(cell) = document.cell(address)
        && let Some(instruction) = cell.as_instruction()
    {
        if instruction.kind().has_fallthrough()
            && let Some(fallthrough) = address.add_offset(u64::from(instruction.length()))
        {
            next.push(fallthrough);
        }
        for (target, kind) in document.cross_references_from(address) {
            if kind == XRefKind::Branch {
                next.push(target);
            }
        }
    }
    next
}

/// Control-flow predecessors: instructions branching here, plus the
/// directly preceding instruction when it falls through to `address`.
fn predecessors(document: &Document, address: &Address) -> Vec<Address> {
    let mut previous = Vec::new();
    if let Some((candidate, cell)) = document.previous_cell(address)
        && let Some(instruction) = cell.as_instruction()
        && instruction.kind().has_fallthrough()
        && candidate.add_offset(u64::from(instruction.length())) == Some(*address)
    {
        previous.push(candidate);
    }
    for (origin, kind) in document.cross_references_to(address) {
        if kind == XRefKind::Branch {
            previous.push(origin);
        }
    }
    previous
}

fn drive(
    analyzer: &Analyzer,
    document: &Document,
    start: Address,
    tracker: &mut dyn Tracker,
    expand: fn(&Document, &Address) -> Vec<Address>,
) {
    let mut frontier = VecDeque::from([start]);
    let mut visited: BTreeSet<Address> = BTreeSet::new();
    while let Some(address) = frontier.pop_front() {
        if !visited.insert(address) {
            continue;
        }
        if !tracker.track(analyzer, document, address) {
            break;
        }
        frontier.extend(expand(document, &address));
    }
}

/// Walk forward from `start` through control-flow successors.
pub fn track_operand(
    analyzer: &Analyzer,
    document: &Document,
    start: Address,
    tracker: &mut dyn Tracker,
) {
    drive(analyzer, document, start, tracker, successors);
}

/// Walk backward from `start` through control-flow predecessors.
pub fn backtrack_operand(
    analyzer: &Analyzer,
    document: &Document,
    start: Address,
    tracker: &mut dyn Tracker,
) {
    drive(analyzer, document, start, tracker, predecessors);
}
