//! Analysis passes over a document.
//!
//! The [`Analyzer`] is the coordinator: it turns the passes into tasks
//! for the worker pool (recursive-traversal disassembly, string
//! discovery), drives callback trackers over control flow, rebuilds
//! control-flow graphs, and renders cells for views. It owns no analysis
//! state of its own — every pass reads and writes the shared document,
//! whose writer lock serializes concurrent passes.
//!
//! The disassembly pass decomposes by function: one task disassembles
//! one function body, and each callee it discovers is enqueued as a
//! fresh task through the scheduler handle. Work spreads across the pool
//! without any coordination beyond the document itself, and re-running
//! any of it is a no-op because a decoded instruction stops the branch
//! that reaches it.

use std::collections::BTreeSet;
use std::sync::Arc;

use core_address::Address;
use core_document::{
    ArchTag, Cell, Document, DocumentError, Label, LabelKind, Mark, MultiCell,
};
use core_plugin::{Architecture, ModuleManager};
use core_tasks::{Task, TaskScheduler};
use thiserror::Error;
use tracing::{debug, warn};

mod cfg;
mod disasm;
mod format;
mod strings;
mod track;

pub use cfg::{BasicBlock, ControlFlowGraph};
pub use disasm::FunctionDisassembly;
pub use track::Tracker;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("no function at the given address")]
    NoSuchFunction,
    #[error("nothing analyzable at the given address")]
    NotFound,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Coordinator of analysis passes. Cheap to clone; clones share the
/// provider registry.
#[derive(Clone)]
pub struct Analyzer {
    modules: Arc<ModuleManager>,
}

impl Analyzer {
    pub fn new(modules: Arc<ModuleManager>) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &Arc<ModuleManager> {
        &self.modules
    }

    // --- passes as tasks ------------------------------------------------

    /// The initial whole-binary pass: start at the document's entry
    /// (`start` label, else the lowest mapped address) and let function
    /// tasks cascade from there.
    pub fn create_disassemble_all_functions_task(
        &self,
        document: Arc<Document>,
        architecture: Arc<dyn Architecture>,
        mode: u8,
        scheduler: TaskScheduler,
    ) -> Task {
        let analyzer = self.clone();
        Task::new("disassemble all functions", move || {
            let Some(entry) = document.start_address() else {
                warn!(target: "analyzer", "document has no entry address, nothing to disassemble");
                return;
            };
            let task = analyzer.create_disassemble_task(
                Arc::clone(&document),
                entry,
                Arc::clone(&architecture),
                mode,
                scheduler.clone(),
            );
            if let Err(error) = scheduler.add_task(task) {
                warn!(target: "analyzer", %error, "could not schedule the entry function");
            }
        })
    }

    /// Disassemble one function and fan out to its callees.
    pub fn create_disassemble_task(
        &self,
        document: Arc<Document>,
        entry: Address,
        architecture: Arc<dyn Architecture>,
        mode: u8,
        scheduler: TaskScheduler,
    ) -> Task {
        let analyzer = self.clone();
        Task::new(format!("disassemble {entry}"), move || {
            let result = analyzer.disassemble(&document, &architecture, mode, entry);
            if result.decoded > 0
                && let Err(error) = analyzer.create_function(&document, entry)
            {
                debug!(target: "analyzer", %entry, %error, "function annotation skipped");
            }
            for callee in result.callees {
                if document.has_instruction_at(&callee) {
                    continue;
                }
                let task = analyzer.create_disassemble_task(
                    Arc::clone(&document),
                    callee,
                    Arc::clone(&architecture),
                    mode,
                    scheduler.clone(),
                );
                if scheduler.add_task(task).is_err() {
                    // The pool is shutting down; drop the cascade.
                    break;
                }
            }
        })
    }

    /// Scan unclaimed bytes for ASCII / UTF-16 strings.
    pub fn create_find_all_string_task(&self, document: Arc<Document>, min_units: usize) -> Task {
        Task::new("find all strings", move || {
            strings::find_strings(&document, min_units);
        })
    }

    // --- synchronous entry points ---------------------------------------

    /// Run the per-function disassembly immediately on this thread.
    pub fn disassemble(
        &self,
        document: &Document,
        architecture: &Arc<dyn Architecture>,
        mode: u8,
        entry: Address,
    ) -> FunctionDisassembly {
        let arch_tag = self
            .modules
            .architecture_tag(architecture)
            .unwrap_or(ArchTag::UNKNOWN);
        disasm::disassemble_function(document, architecture.as_ref(), arch_tag, mode, entry)
    }

    /// Run the string scan immediately on this thread. Returns the
    /// number of strings claimed.
    pub fn find_strings(&self, document: &Document, min_units: usize) -> usize {
        strings::find_strings(document, min_units)
    }

    /// Annotate the decoded function at `entry`: a function multicell
    /// carrying its extent and basic-block set, plus a `fcn_<offset>`
    /// label when the entry is unnamed.
    pub fn create_function(
        &self,
        document: &Document,
        entry: Address,
    ) -> Result<(), AnalyzerError> {
        let graph = cfg::build_control_flow_graph(document, entry)?;
        let blocks: BTreeSet<Address> = graph.blocks().iter().map(BasicBlock::first).collect();
        document.set_multi_cell(entry, MultiCell::function(graph.byte_size(), blocks), true)?;
        if document.label_at(&entry).is_none() {
            let name = format!("fcn_{:x}", entry.offset());
            if document.address_of_label(&name).is_none() {
                document.add_label(entry, Label::new(name, LabelKind::Code))?;
            }
        }
        Ok(())
    }

    pub fn build_control_flow_graph(
        &self,
        document: &Document,
        entry: Address,
    ) -> Result<ControlFlowGraph, AnalyzerError> {
        cfg::build_control_flow_graph(document, entry)
    }

    /// Drive `tracker` forward from `start` through control-flow
    /// successors; each address is offered at most once.
    pub fn track_operand(&self, document: &Document, start: Address, tracker: &mut dyn Tracker) {
        track::track_operand(self, document, start, tracker);
    }

    /// Drive `tracker` backward from `start` through control-flow
    /// predecessors.
    pub fn backtrack_operand(
        &self,
        document: &Document,
        start: Address,
        tracker: &mut dyn Tracker,
    ) {
        track::backtrack_operand(self, document, start, tracker);
    }

    /// Render the cell at `address` for display.
    pub fn format_cell(
        &self,
        document: &Document,
        address: &Address,
        cell: &Cell,
    ) -> Result<(String, Vec<Mark>), AnalyzerError> {
        format::format_cell(&self.modules, document, address, cell)
    }

    /// Render a multicell banner for display.
    pub fn format_multi_cell(
        &self,
        document: &Document,
        address: &Address,
        multicell: &MultiCell,
    ) -> Result<(String, Vec<Mark>), AnalyzerError> {
        format::format_multi_cell(document, address, multicell)
    }
}
