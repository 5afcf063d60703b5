mod common;

use common::{CODE_BASE, addr, fixture};
use core_address::Address;
use core_analyzer::{Analyzer, Tracker};
use core_document::Document;

/// Records every offered address; optionally gives up after a budget.
struct Recording {
    visited: Vec<Address>,
    budget: Option<usize>,
}

impl Recording {
    fn unlimited() -> Self {
        Self {
            visited: Vec::new(),
            budget: None,
        }
    }

    fn with_budget(budget: usize) -> Self {
        Self {
            visited: Vec::new(),
            budget: Some(budget),
        }
    }
}

impl Tracker for Recording {
    fn track(&mut self, _analyzer: &Analyzer, _document: &Document, address: Address) -> bool {
        self.visited.push(address);
        match &mut self.budget {
            Some(0) => false,
            Some(budget) => {
                *budget -= 1;
                true
            }
            None => true,
        }
    }
}

#[test]
fn forward_walk_covers_straight_line_code() {
    // 0x100 mov ; 0x103 nop ; 0x104 ret
    let fx = fixture(&[0xB0, 0x01, 0x2A, 0x90, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));

    let mut tracker = Recording::unlimited();
    fx.analyzer
        .track_operand(&fx.document, addr(CODE_BASE), &mut tracker);
    assert_eq!(tracker.visited, vec![addr(0x100), addr(0x103), addr(0x104)]);
}

#[test]
fn loop_is_visited_once_and_terminates() {
    // 0x100 nop ; 0x101 jnz -3 -> 0x100 ; 0x103 ret
    let fx = fixture(&[0x90, 0x75, 0xFD, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));

    let mut tracker = Recording::unlimited();
    fx.analyzer
        .track_operand(&fx.document, addr(CODE_BASE), &mut tracker);

    let mut sorted = tracker.visited.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), tracker.visited.len(), "an address was revisited");
    assert_eq!(sorted, vec![addr(0x100), addr(0x101), addr(0x103)]);
}

#[test]
fn returning_false_ends_the_session() {
    let fx = fixture(&[0xB0, 0x01, 0x2A, 0x90, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));

    let mut tracker = Recording::with_budget(1);
    fx.analyzer
        .track_operand(&fx.document, addr(CODE_BASE), &mut tracker);
    assert_eq!(tracker.visited, vec![addr(0x100), addr(0x103)]);
}

#[test]
fn backward_walk_reaches_branch_origins_and_fallthrough() {
    // 0x100 jnz +1 -> 0x103 ; 0x102 ret ; 0x103 nop ; 0x104 ret
    let fx = fixture(&[0x75, 0x01, 0x00, 0x90, 0x00]);
    fx.analyzer
        .disassemble(&fx.document, &fx.architecture, 0, addr(CODE_BASE));

    // 0x103 is reached by the taken branch from 0x100 only (0x102 is a
    // ret, so the preceding-cell rule does not apply).
    let mut tracker = Recording::unlimited();
    fx.analyzer
        .backtrack_operand(&fx.document, addr(0x103), &mut tracker);
    assert_eq!(tracker.visited, vec![addr(0x103), addr(0x100)]);

    // 0x104 is reached from 0x103 by fall-through.
    let mut tracker = Recording::unlimited();
    fx.analyzer
        .backtrack_operand(&fx.document, addr(0x104), &mut tracker);
    assert_eq!(
        tracker.visited,
        vec![addr(0x104), addr(0x103), addr(0x100)]
    );
}
