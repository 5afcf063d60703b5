//! Configuration, in two layers.
//!
//! [`options`] is the provider-facing model: architectures and loaders
//! contribute named options (boolean toggles, discrete choices, free
//! text) to a [`options::ConfigurationModel`]; a UI fills in values and
//! hands the resulting flat [`options::Configuration`] back to the
//! provider. Unknown names are ignored silently so configurations can
//! outlive provider revisions; type mismatches are rejected.
//!
//! [`settings`] is the engine's own `gorgon.toml`: worker-pool sizing,
//! string-scan tuning, log destination. Parsing is forgiving — a missing
//! or malformed file yields defaults, matching the rule that
//! configuration must never stop an analysis from starting.

pub mod options;
pub mod settings;

pub use options::{ConfigError, ConfigOption, ConfigValue, Configuration, ConfigurationModel};
pub use settings::{Settings, SettingsFile, discover, load_from};
