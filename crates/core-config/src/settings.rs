//! Engine settings from `gorgon.toml`.
//!
//! Recognized today:
//!
//! ```toml
//! [tasks]
//! workers = 4        # 0 (default) = available hardware parallelism
//!
//! [strings]
//! min_length = 4     # minimum run length the string finder accepts
//!
//! [log]
//! file = "gorgon.log"
//! ```
//!
//! Unknown fields are tolerated so the file can grow without breaking
//! older builds; a malformed file falls back to defaults rather than
//! aborting startup.

use std::{fs, path::PathBuf};

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct TasksConfig {
    /// Worker-thread count; 0 resolves to hardware parallelism.
    #[serde(default)]
    pub workers: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StringsConfig {
    #[serde(default = "StringsConfig::default_min_length")]
    pub min_length: usize,
}

impl Default for StringsConfig {
    fn default() -> Self {
        Self {
            min_length: Self::default_min_length(),
        }
    }
}

impl StringsConfig {
    const fn default_min_length() -> usize {
        4
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "LogConfig::default_file")]
    pub file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: Self::default_file(),
        }
    }
}

impl LogConfig {
    fn default_file() -> String {
        "gorgon.log".to_string()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SettingsFile {
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub strings: StringsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Default, Clone)]
pub struct Settings {
    /// Original file contents, when one was read.
    pub raw: Option<String>,
    pub file: SettingsFile,
}

impl Settings {
    /// Effective worker count: the configured value, or hardware
    /// parallelism (minimum 1) when unset.
    pub fn worker_count(&self) -> usize {
        if self.file.tasks.workers > 0 {
            return self.file.tasks.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    pub fn min_string_length(&self) -> usize {
        self.file.strings.min_length.max(1)
    }

    pub fn log_file(&self) -> &str {
        &self.file.log.file
    }
}

/// Best-effort settings path: prefer a working-directory `gorgon.toml`,
/// then the platform config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("gorgon.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("gorgon").join("gorgon.toml");
    }
    PathBuf::from("gorgon.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Settings> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<SettingsFile>(&content) {
            Ok(file) => Ok(Settings {
                raw: Some(content),
                file,
            }),
            // A malformed file falls back to defaults, silently: the
            // settings layer must never stop an analysis from starting.
            Err(_error) => Ok(Settings::default()),
        }
    } else {
        Ok(Settings::default())
    }
}
