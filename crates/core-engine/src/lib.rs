//! The engine facade.
//!
//! [`Engine`] wires the pieces together: it owns the document, the
//! analyzer, and the worker pool, and exposes the operations a front-end
//! drives — start an analysis session from a stream and a provider set,
//! request targeted disassembly, wait for the pipeline to drain, build
//! CFGs, format cells, run trackers.
//!
//! Providers register with the [`ModuleManager`] before the engine is
//! built; the engine only resolves them. `start` performs the canonical
//! wiring order: stream endianness from the architecture, stream into
//! the database, database into the document, loader mapping, then the
//! initial disassembly and string-scan tasks.

use std::sync::Arc;

use core_address::Address;
use core_analyzer::{Analyzer, AnalyzerError, ControlFlowGraph, Tracker};
use core_binary::BinaryStream;
use core_config::Settings;
use core_document::{Database, Document, Mark};
use core_plugin::{Architecture, Loader, ModuleManager, OperatingSystem};
use core_tasks::{Task, TaskError, TaskManager, TaskStatusHandle};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The cell or provider needed to honor the request does not exist.
    #[error("nothing analyzable at the given address")]
    NotFound,
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
}

pub struct Engine {
    modules: Arc<ModuleManager>,
    document: Arc<Document>,
    analyzer: Analyzer,
    task_manager: TaskManager,
    operating_system: Option<Arc<dyn OperatingSystem>>,
    min_string_length: usize,
}

impl Engine {
    /// Build the engine and start its worker pool. The pool idles until
    /// [`Engine::start`] enqueues work.
    pub fn new(modules: Arc<ModuleManager>, settings: &Settings) -> Self {
        let mut task_manager = TaskManager::new(settings.worker_count(), |task: &Task| {
            info!(
                target: "engine",
                task = task.name(),
                status = ?task.status(),
                "task finished"
            );
        });
        task_manager.start();
        Self {
            analyzer: Analyzer::new(Arc::clone(&modules)),
            modules,
            document: Arc::new(Document::new()),
            task_manager,
            operating_system: None,
            min_string_length: settings.min_string_length(),
        }
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn modules(&self) -> &Arc<ModuleManager> {
        &self.modules
    }

    /// Begin an analysis session.
    ///
    /// Binds `stream` (endianness taken from the architecture) to the
    /// database and the database to the document, has the loader populate
    /// the memory map and initial labels, then enqueues the
    /// disassemble-everything and find-all-strings tasks. Without an
    /// architecture the session still maps and scans for strings; code
    /// analysis waits for an `analyze` call carrying one.
    pub fn start(
        &mut self,
        mut stream: BinaryStream,
        loader: Arc<dyn Loader>,
        architecture: Option<Arc<dyn Architecture>>,
        operating_system: Option<Arc<dyn OperatingSystem>>,
        mut database: Box<dyn Database>,
    ) -> anyhow::Result<()> {
        if let Some(architecture) = &architecture {
            stream.set_endianness(architecture.endianness());
        }
        let stream = Arc::new(stream);
        database.set_binary_stream(Arc::clone(&stream));
        self.document.set_binary_stream(stream);
        self.document.use_database(database);

        loader.map(&self.document)?;
        info!(target: "engine", loader = loader.name(), "loader mapped the stream");

        if let Some(architecture) = architecture {
            let entry = self
                .document
                .start_address()
                .unwrap_or(Address::linear(0, 32));
            let mode = architecture.default_mode(&entry);
            let scheduler = self.task_manager.scheduler();
            self.task_manager
                .add_task(self.analyzer.create_disassemble_all_functions_task(
                    Arc::clone(&self.document),
                    architecture,
                    mode,
                    scheduler,
                ))?;
        } else {
            warn!(target: "engine", "no architecture selected, skipping disassembly");
        }
        self.task_manager
            .add_task(
                self.analyzer
                    .create_find_all_string_task(Arc::clone(&self.document), self.min_string_length),
            )?;

        self.operating_system = operating_system;
        Ok(())
    }

    /// Enqueue a targeted disassembly at `address`.
    ///
    /// A missing architecture resolves through the cell's tag and a
    /// missing mode through the cell, then the architecture default.
    /// Unresolvable requests are reported, not swallowed.
    pub fn analyze(
        &self,
        address: Address,
        architecture: Option<Arc<dyn Architecture>>,
        mode: Option<u8>,
    ) -> Result<TaskStatusHandle, EngineError> {
        let cell = self.document.cell(&address);
        let architecture = match architecture {
            Some(architecture) => architecture,
            None => {
                let cell = cell.as_ref().ok_or(EngineError::NotFound)?;
                self.modules
                    .architecture(cell.arch_tag())
                    .ok_or(EngineError::NotFound)?
            }
        };
        let mode = mode
            .or_else(|| cell.as_ref().map(|cell| cell.mode()).filter(|mode| *mode != 0))
            .unwrap_or_else(|| architecture.default_mode(&address));

        let scheduler = self.task_manager.scheduler();
        let task = self.analyzer.create_disassemble_task(
            Arc::clone(&self.document),
            address,
            architecture,
            mode,
            scheduler,
        );
        Ok(self.task_manager.add_task(task)?)
    }

    /// Submit an arbitrary task to the pool.
    pub fn add_task(&self, task: Task) -> Result<TaskStatusHandle, EngineError> {
        Ok(self.task_manager.add_task(task)?)
    }

    /// Block until the analysis pipeline has drained.
    pub fn wait_for_tasks(&self) {
        self.task_manager.wait();
    }

    /// Annotate the function at `address` and run the OS post-creation
    /// hook when a platform layer is attached.
    pub fn create_function(&self, address: Address) -> Result<(), EngineError> {
        self.analyzer.create_function(&self.document, address)?;
        if let Some(operating_system) = &self.operating_system
            && let Err(error) = operating_system.analyze_function(&self.document, address)
        {
            warn!(
                target: "engine",
                os = operating_system.name(),
                %address,
                %error,
                "operating-system function analysis failed"
            );
        }
        Ok(())
    }

    pub fn build_control_flow_graph(
        &self,
        address: Address,
    ) -> Result<ControlFlowGraph, EngineError> {
        Ok(self
            .analyzer
            .build_control_flow_graph(&self.document, address)?)
    }

    /// Render the cell at `address`.
    pub fn format_cell(&self, address: &Address) -> Result<(String, Vec<Mark>), EngineError> {
        let cell = self.document.cell(address).ok_or(EngineError::NotFound)?;
        Ok(self.analyzer.format_cell(&self.document, address, &cell)?)
    }

    /// Render the multicell headed at `address`.
    pub fn format_multi_cell(&self, address: &Address) -> Result<(String, Vec<Mark>), EngineError> {
        let multicell = self
            .document
            .multi_cell(address)
            .ok_or(EngineError::NotFound)?;
        Ok(self
            .analyzer
            .format_multi_cell(&self.document, address, &multicell)?)
    }

    pub fn track_operand(&self, start: Address, tracker: &mut dyn Tracker) {
        self.analyzer.track_operand(&self.document, start, tracker);
    }

    pub fn backtrack_operand(&self, start: Address, tracker: &mut dyn Tracker) {
        self.analyzer
            .backtrack_operand(&self.document, start, tracker);
    }

    /// Resolve a flat offset against the memory map, falling back to a
    /// bare linear address when nothing is mapped there.
    pub fn make_address(&self, offset: u64) -> Address {
        for area in self.document.memory_areas() {
            let candidate = area.start().with_offset(offset);
            if area.translate(&candidate).is_some() {
                return candidate;
            }
        }
        Address::linear(offset, 32)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Drain and join the workers first so the terminal event is the
        // last thing subscribers observe.
        self.task_manager.stop();
        self.document.quit();
    }
}
