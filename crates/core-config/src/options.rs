//! Provider option declarations and the flat name -> value store.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("option {name:?} was set with a value of the wrong type")]
    TypeMismatch { name: String },
}

/// A single option value. The variant fixes the option's type for the
/// lifetime of the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Bool(bool),
    /// A discrete choice, stored as the chosen entry's numeric value.
    Enum(u64),
    String(String),
}

impl ConfigValue {
    fn same_type(&self, other: &ConfigValue) -> bool {
        matches!(
            (self, other),
            (ConfigValue::Bool(_), ConfigValue::Bool(_))
                | (ConfigValue::Enum(_), ConfigValue::Enum(_))
                | (ConfigValue::String(_), ConfigValue::String(_))
        )
    }
}

/// An option as declared by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOption {
    Bool {
        name: String,
        default: bool,
    },
    /// Labeled discrete choices; `default` must be one of the values.
    Enum {
        name: String,
        choices: Vec<(String, u64)>,
        default: u64,
    },
    String {
        name: String,
        default: String,
    },
}

impl ConfigOption {
    pub fn name(&self) -> &str {
        match self {
            ConfigOption::Bool { name, .. }
            | ConfigOption::Enum { name, .. }
            | ConfigOption::String { name, .. } => name,
        }
    }

    pub fn default_value(&self) -> ConfigValue {
        match self {
            ConfigOption::Bool { default, .. } => ConfigValue::Bool(*default),
            ConfigOption::Enum { default, .. } => ConfigValue::Enum(*default),
            ConfigOption::String { default, .. } => ConfigValue::String(default.clone()),
        }
    }
}

/// The set of options a provider understands. Providers append to the
/// model in `fill_configuration_model`; UIs iterate it to prompt.
#[derive(Debug, Default, Clone)]
pub struct ConfigurationModel {
    options: Vec<ConfigOption>,
}

impl ConfigurationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bool(&mut self, name: impl Into<String>, default: bool) {
        self.options.push(ConfigOption::Bool {
            name: name.into(),
            default,
        });
    }

    pub fn add_enum(
        &mut self,
        name: impl Into<String>,
        choices: Vec<(String, u64)>,
        default: u64,
    ) {
        self.options.push(ConfigOption::Enum {
            name: name.into(),
            choices,
            default,
        });
    }

    pub fn add_string(&mut self, name: impl Into<String>, default: impl Into<String>) {
        self.options.push(ConfigOption::String {
            name: name.into(),
            default: default.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigOption> {
        self.options.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// A configuration populated with every option's default.
    pub fn configuration(&self) -> Configuration {
        Configuration {
            values: self
                .options
                .iter()
                .map(|option| (option.name().to_string(), option.default_value()))
                .collect(),
        }
    }
}

/// Flat name -> value mapping handed to providers.
#[derive(Debug, Default, Clone)]
pub struct Configuration {
    values: HashMap<String, ConfigValue>,
}

impl Configuration {
    /// Update an option. Unknown names are ignored silently (a stale UI
    /// or saved session may carry options this provider no longer
    /// declares); a value of the wrong type is rejected.
    pub fn set(&mut self, name: &str, value: ConfigValue) -> Result<(), ConfigError> {
        let Some(current) = self.values.get_mut(name) else {
            return Ok(());
        };
        if !current.same_type(&value) {
            return Err(ConfigError::TypeMismatch {
                name: name.to_string(),
            });
        }
        *current = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.values.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ConfigValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_enum(&self, name: &str) -> Option<u64> {
        match self.values.get(name) {
            Some(ConfigValue::Enum(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ConfigValue::String(value)) => Some(value),
            _ => None,
        }
    }
}
