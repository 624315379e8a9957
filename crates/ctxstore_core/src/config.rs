//! Store configuration.
//!
//! # Responsibility
//! - Describe which backend to open and where its data lives.
//! - Validate settings before any backend is touched.
//!
//! # Invariants
//! - `model_name` is a plain identifier; it becomes the database file stem.
//! - File-backed stores require an absolute `directory`.
//! - The memory backend is always in-memory.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,63}$").expect("valid model name regex"));

const DATABASE_FILE_EXTENSION: &str = "sqlite3";

/// Storage engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

/// Configuration used to open the record store behind a context stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfiguration {
    /// Logical model name; also the database file stem.
    pub model_name: String,
    /// Keep all data in memory (useful for tests).
    pub in_memory: bool,
    /// Directory holding the database file when not in memory.
    pub directory: Option<PathBuf>,
    pub backend: StoreBackend,
}

impl Default for StoreConfiguration {
    fn default() -> Self {
        Self {
            model_name: "Model".to_string(),
            in_memory: true,
            directory: None,
            backend: StoreBackend::Memory,
        }
    }
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidModelName(String),
    MissingDirectory,
    RelativeDirectory(PathBuf),
    MemoryBackendNotPersistent,
    Parse(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidModelName(name) => write!(
                f,
                "model name `{name}` must start with a letter and contain only letters, digits, `_` or `-`"
            ),
            Self::MissingDirectory => write!(f, "file-backed store requires a directory"),
            Self::RelativeDirectory(path) => write!(
                f,
                "store directory must be an absolute path, got `{}`",
                path.display()
            ),
            Self::MemoryBackendNotPersistent => {
                write!(f, "memory backend cannot be opened with in_memory = false")
            }
            Self::Parse(message) => write!(f, "invalid store configuration: {message}"),
        }
    }
}

impl Error for ConfigError {}

impl StoreConfiguration {
    /// In-memory configuration on the given backend.
    pub fn in_memory(model_name: impl Into<String>, backend: StoreBackend) -> Self {
        Self {
            model_name: model_name.into(),
            in_memory: true,
            directory: None,
            backend,
        }
    }

    /// File-backed SQLite configuration.
    pub fn sqlite_file(model_name: impl Into<String>, directory: impl AsRef<Path>) -> Self {
        Self {
            model_name: model_name.into(),
            in_memory: false,
            directory: Some(directory.as_ref().to_path_buf()),
            backend: StoreBackend::Sqlite,
        }
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !MODEL_NAME_RE.is_match(&self.model_name) {
            return Err(ConfigError::InvalidModelName(self.model_name.clone()));
        }
        match (self.backend, self.in_memory) {
            (StoreBackend::Memory, false) => Err(ConfigError::MemoryBackendNotPersistent),
            (StoreBackend::Memory, true) | (StoreBackend::Sqlite, true) => Ok(()),
            (StoreBackend::Sqlite, false) => match &self.directory {
                None => Err(ConfigError::MissingDirectory),
                Some(dir) if !dir.is_absolute() => Err(ConfigError::RelativeDirectory(dir.clone())),
                Some(_) => Ok(()),
            },
        }
    }

    /// Database file path for file-backed stores; `None` when in memory.
    pub fn database_path(&self) -> Option<PathBuf> {
        if self.in_memory {
            return None;
        }
        self.directory.as_ref().map(|dir| {
            dir.join(format!("{}.{DATABASE_FILE_EXTENSION}", self.model_name))
        })
    }
}
