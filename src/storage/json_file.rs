use crate::storage::{Config, Database, Result, StorageBackend, StorageError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stores the whole database as one JSON document.
///
/// Saves write a sibling temp file, sync it and rename it over the store, so
/// readers see either the previous snapshot or the new one.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    pretty: bool,
}

impl JsonFileStorage {
    pub fn open(cfg: &Config) -> Self {
        Self {
            path: cfg.data_file.clone(),
            pretty: cfg.pretty,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "database.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, db: &Database) -> Result<()> {
        let mut body = if self.pretty {
            serde_json::to_vec_pretty(db)?
        } else {
            serde_json::to_vec(db)?
        };
        body.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let temp = self.temp_path();
        let mut file = File::create(&temp).map_err(io_error(&temp))?;
        file.write_all(&body).map_err(io_error(&temp))?;
        file.sync_all().map_err(io_error(&temp))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(io_error(&self.path))?;
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl StorageBackend for JsonFileStorage {
    fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        log::info!("Creating empty store at {}", self.path.display());
        self.write_atomic(&Database::new())
    }

    fn load(&self) -> Result<Database> {
        let data = fs::read_to_string(&self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| StorageError::InvalidDocument {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, db: &Database) -> Result<()> {
        log::debug!("Writing {} records to {}", db.len(), self.path.display());
        self.write_atomic(db)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
