//! Provider contracts and their registry.
//!
//! The engine consumes four provider families: [`Architecture`] (decode
//! and format instructions), [`Loader`] (recognize a container format and
//! map it into a document), [`OperatingSystem`] (platform-specific
//! follow-up analysis), and the database factories producing
//! `core_document::Database` back-ends. The [`ModuleManager`] is the
//! registry: providers register before the engine starts, and all reads
//! afterwards are plain slice walks on an immutable registry — no lock.
//!
//! Dynamic discovery (scanning a plugin directory for shared objects) is
//! intentionally not implemented; [`ModuleManager::load_modules`] keeps
//! the probe-and-self-register shape over the built-in provider set so a
//! discovery layer can slot in without touching callers.

pub mod builtin;
pub mod format;
pub mod manager;
pub mod providers;

pub use builtin::{MemoryDatabase, MemoryDatabaseFactory, RawLoader};
pub use manager::ModuleManager;
pub use providers::{Architecture, DatabaseFactory, Loader, OperatingSystem};
