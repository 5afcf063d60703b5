//! Control-flow graph reconstruction.
//!
//! Nodes are basic blocks: maximal straight-line instruction runs with a
//! single entry (a leader) and a single exit (a jump, a conditional
//! jump, a return, or falling into the next leader). Calls do not end a
//! block here — the bundled instruction model always gives calls a
//! fall-through. Edges follow the same successor rules the disassembly
//! pass uses, so a graph built right after a pass reflects exactly what
//! was decoded.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use core_address::Address;
use core_document::{Document, InstructionKind};

use crate::AnalyzerError;

/// One straight-line run of instruction addresses, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    addresses: Vec<Address>,
    /// One past the last byte of the final instruction.
    end_offset: u64,
}

impl BasicBlock {
    pub fn first(&self) -> Address {
        self.addresses[0]
    }

    pub fn last(&self) -> Address {
        self.addresses[self.addresses.len() - 1]
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }
}

/// A function's basic blocks and the edges between them.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    entry: Address,
    blocks: Vec<BasicBlock>,
    edges: BTreeSet<(usize, usize)>,
}

impl ControlFlowGraph {
    pub fn entry(&self) -> Address {
        self.entry
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Directed edges as (from, to) indices into [`Self::blocks`].
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> {
        self.edges.iter().copied()
    }

    pub fn block_of(&self, address: &Address) -> Option<usize> {
        self.blocks
            .iter()
            .position(|block| block.addresses.contains(address))
    }

    /// Extent of the function in bytes: entry to the end of its furthest
    /// block within the entry's address space.
    pub fn byte_size(&self) -> u64 {
        self.blocks
            .iter()
            .map(BasicBlock::end_offset)
            .max()
            .map(|end| end.saturating_sub(self.entry.offset()))
            .unwrap_or(0)
    }
}

struct DecodedFlow {
    length: u64,
    kind: InstructionKind,
    target: Option<Address>,
}

/// Build the graph of the function entered at `entry`.
///
/// Fails with [`AnalyzerError::NoSuchFunction`] when `entry` does not
/// hold an instruction cell. Instructions reachable from `entry` through
/// fall-through and branch edges (calls contribute fall-through only)
/// are partitioned into blocks.
pub fn build_control_flow_graph(
    document: &Document,
    entry: Address,
) -> Result<ControlFlowGraph, AnalyzerError> {
    if !document.has_instruction_at(&entry) {
        return Err(AnalyzerError::NoSuchFunction);
    }

    // Reachability sweep: collect every instruction in the function and
    // the set of block leaders.
    let mut flows: BTreeMap<Address, DecodedFlow> = BTreeMap::new();
    let mut leaders: BTreeSet<Address> = BTreeSet::from([entry]);
    let mut worklist = VecDeque::from([entry]);
    while let Some(address) = worklist.pop_front() {
        if flows.contains_key(&address) {
            continue;
        }
        let Some(cell) = document.cell(&address) else {
            continue;
        };
        let Some(instruction) = cell.as_instruction() else {
            continue;
        };
        let flow = DecodedFlow {
            length: u64::from(instruction.length()),
            kind: instruction.kind(),
            target: instruction.target_from(&address),
        };
        let fallthrough = address.add_offset(flow.length);
        match flow.kind {
            InstructionKind::Normal | InstructionKind::Call => {
                if let Some(next) = fallthrough {
                    worklist.push_back(next);
                }
            }
            InstructionKind::Jump => {
                if let Some(target) = flow.target {
                    leaders.insert(target);
                    worklist.push_back(target);
                }
            }
            InstructionKind::ConditionalJump => {
                if let Some(target) = flow.target {
                    leaders.insert(target);
                    worklist.push_back(target);
                }
                if let Some(next) = fallthrough {
                    leaders.insert(next);
                    worklist.push_back(next);
                }
            }
            InstructionKind::Return => {}
        }
        flows.insert(address, flow);
    }
    leaders.retain(|leader| flows.contains_key(leader));

    // Partition: walk from each leader to the next block boundary.
    let mut blocks = Vec::new();
    let mut block_of: BTreeMap<Address, usize> = BTreeMap::new();
    for leader in &leaders {
        let index = blocks.len();
        let mut addresses = Vec::new();
        let mut cursor = *leader;
        let end_offset = loop {
            let flow = &flows[&cursor];
            addresses.push(cursor);
            block_of.insert(cursor, index);
            let end = cursor.offset().saturating_add(flow.length);
            if flow.kind.ends_block() && !matches!(flow.kind, InstructionKind::Call) {
                break end;
            }
            match cursor.add_offset(flow.length) {
                Some(next) if flows.contains_key(&next) && !leaders.contains(&next) => {
                    cursor = next;
                }
                _ => break end,
            }
        };
        blocks.push(BasicBlock {
            addresses,
            end_offset,
        });
    }

    // Edges from each block's exit instruction.
    let mut edges = BTreeSet::new();
    for (index, block) in blocks.iter().enumerate() {
        let exit = block.last();
        let flow = &flows[&exit];
        let mut connect = |successor: Option<Address>| {
            if let Some(successor) = successor
                && let Some(to) = block_of.get(&successor)
            {
                edges.insert((index, *to));
            }
        };
        match flow.kind {
            InstructionKind::Jump => connect(flow.target),
            InstructionKind::ConditionalJump => {
                connect(flow.target);
                connect(exit.add_offset(flow.length));
            }
            InstructionKind::Normal | InstructionKind::Call => {
                connect(exit.add_offset(flow.length));
            }
            InstructionKind::Return => {}
        }
    }

    Ok(ControlFlowGraph {
        entry,
        blocks,
        edges,
    })
}
