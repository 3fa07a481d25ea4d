pub mod database;
pub mod json_file;
pub mod memory;

pub use database::Database;
pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;

use std::path::PathBuf;

#[derive(Debug)]
pub enum StorageError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialization(serde_json::Error),
    InvalidDocument {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Storage I/O error on {}: {source}", path.display())
            }
            Self::Serialization(e) => write!(f, "Store encoding error: {e}"),
            Self::InvalidDocument { path, source } => {
                write!(f, "Invalid store file {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialization(e) | Self::InvalidDocument { source: e, .. } => Some(e),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable home of a [`Database`] snapshot. Every save replaces the whole snapshot.
pub trait StorageBackend: Send + Sync {
    /// Creates an empty store if none exists. Calling it again leaves the store untouched.
    fn ensure_exists(&self) -> Result<()>;
    fn load(&self) -> Result<Database>;
    fn save(&self, db: &Database) -> Result<()>;
    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_file: PathBuf,
    /// Two-space indented output, matching hand-edited store files.
    pub pretty: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("./database.json"),
            pretty: true,
        }
    }
}
