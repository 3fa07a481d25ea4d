use crate::storage::{Database, Result, StorageBackend};
use std::sync::{Arc, Mutex, PoisonError};

/// Keeps the snapshot in process memory. Clones share the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    snapshot: Arc<Mutex<Option<Database>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the last saved snapshot.
    pub fn saved_len(&self) -> Option<usize> {
        self.lock().as_ref().map(Database::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Database>> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for MemoryStorage {
    fn ensure_exists(&self) -> Result<()> {
        self.lock().get_or_insert_with(Database::new);
        Ok(())
    }

    fn load(&self) -> Result<Database> {
        Ok(self.lock().clone().unwrap_or_default())
    }

    fn save(&self, db: &Database) -> Result<()> {
        *self.lock() = Some(db.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
