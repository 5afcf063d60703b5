//! The provider registry.

use std::path::Path;
use std::sync::Arc;

use core_binary::BinaryStream;
use core_document::ArchTag;
use tracing::info;

use crate::builtin;
use crate::providers::{Architecture, DatabaseFactory, Loader, OperatingSystem};

/// Registry of discovered providers.
///
/// Registrations (`&mut self`) happen during startup, before any worker
/// thread exists; afterwards the registry is shared immutably (typically
/// behind an `Arc`) and every read is lock-free.
#[derive(Default)]
pub struct ModuleManager {
    loaders: Vec<Arc<dyn Loader>>,
    architectures: Vec<Arc<dyn Architecture>>,
    operating_systems: Vec<Arc<dyn OperatingSystem>>,
    databases: Vec<Arc<dyn DatabaseFactory>>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe-and-register pass over the available provider set.
    ///
    /// Stands in for dynamic plugin discovery: the built-in providers
    /// play the role of plugin factories, and loaders self-register only
    /// when they recognize the probe stream. `search_path` is accepted
    /// (and logged) so a discovery layer can reuse this entry point.
    pub fn load_modules(&mut self, search_path: &Path, probe: &BinaryStream) {
        info!(
            target: "core.plugin",
            path = %search_path.display(),
            "loading modules (built-in provider set)"
        );
        for loader in builtin::loaders() {
            if loader.can_load(probe) {
                info!(target: "core.plugin", loader = loader.name(), "loader recognized the stream");
                self.register_loader(loader);
            }
        }
        for database in builtin::databases() {
            self.register_database(database);
        }
    }

    pub fn register_loader(&mut self, loader: Arc<dyn Loader>) {
        self.loaders.push(loader);
    }

    /// Register an architecture, returning the tag cells decoded by it
    /// will carry. Registering the same instance twice yields the same
    /// tag. Tag 0 stays reserved for "unknown".
    pub fn register_architecture(&mut self, architecture: Arc<dyn Architecture>) -> ArchTag {
        if let Some(tag) = self.architecture_tag(&architecture) {
            return tag;
        }
        self.architectures.push(architecture);
        ArchTag::new(self.architectures.len() as u16)
    }

    pub fn register_operating_system(&mut self, operating_system: Arc<dyn OperatingSystem>) {
        self.operating_systems.push(operating_system);
    }

    pub fn register_database(&mut self, database: Arc<dyn DatabaseFactory>) {
        self.databases.push(database);
    }

    pub fn loaders(&self) -> &[Arc<dyn Loader>] {
        &self.loaders
    }

    pub fn architectures(&self) -> &[Arc<dyn Architecture>] {
        &self.architectures
    }

    pub fn databases(&self) -> &[Arc<dyn DatabaseFactory>] {
        &self.databases
    }

    /// Resolve a cell's architecture tag back to its provider.
    pub fn architecture(&self, tag: ArchTag) -> Option<Arc<dyn Architecture>> {
        if tag.is_unknown() {
            return None;
        }
        self.architectures
            .get(usize::from(tag.index()) - 1)
            .cloned()
    }

    /// The tag a registered architecture instance was assigned.
    pub fn architecture_tag(&self, architecture: &Arc<dyn Architecture>) -> Option<ArchTag> {
        self.architectures
            .iter()
            .position(|known| Arc::ptr_eq(known, architecture))
            .map(|index| ArchTag::new(index as u16 + 1))
    }

    /// The first registered OS layer supporting the pairing.
    pub fn operating_system(
        &self,
        loader: &dyn Loader,
        architecture: &dyn Architecture,
    ) -> Option<Arc<dyn OperatingSystem>> {
        self.operating_systems
            .iter()
            .find(|os| os.supports(loader, architecture))
            .cloned()
    }
}
