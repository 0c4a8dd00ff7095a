//! Shared process state for the board core and the HTTP layer.
//!
//! `CoreState` is wrapped in `Arc` at startup. Every request opens its own
//! SQLite connection through `open_db()`; cascade workers do the same, so no
//! connection is ever shared across threads.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::db::{self, DatabaseError};
use crate::storage::{LocalObjectStorage, ObjectStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Data directory error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct CoreState {
    pub config: Config,
    db_path: PathBuf,
    storage: Arc<dyn ObjectStorage>,
    /// Bounds concurrent per-dashboard cascade updates.
    cascade_permits: Arc<Semaphore>,
}

impl CoreState {
    /// Prepare data directories, run migrations and set up local file storage.
    pub fn open(config: Config) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let storage = LocalObjectStorage::new(config.uploads_dir(), config.public_url.clone())?;
        Self::with_storage(config, Arc::new(storage))
    }

    /// Same as `open` but with a caller-supplied storage backend.
    pub fn with_storage(config: Config, storage: Arc<dyn ObjectStorage>) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_path = config.db_path();
        // Runs migrations once up front; later connections find them applied.
        drop(db::open_database(&db_path)?);
        tracing::info!(path = %db_path.display(), "Database ready");

        let cascade_permits = Arc::new(Semaphore::new(config.cascade_concurrency));
        Ok(Self {
            config,
            db_path,
            storage,
            cascade_permits,
        })
    }

    /// Open a fresh connection to the board database.
    pub fn open_db(&self) -> Result<Connection, CoreError> {
        Ok(db::open_database(&self.db_path)?)
    }

    pub fn storage(&self) -> &dyn ObjectStorage {
        self.storage.as_ref()
    }

    pub fn cascade_permits(&self) -> Arc<Semaphore> {
        self.cascade_permits.clone()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::storage::memory::MemoryObjectStorage;

    /// CoreState on a temp directory with in-memory object storage.
    /// Keep the `TempDir` alive for the duration of the test.
    pub(crate) fn test_core() -> (Arc<CoreState>, Arc<MemoryObjectStorage>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(MemoryObjectStorage::default());
        let core = CoreState::with_storage(Config::with_data_dir(tmp.path()), storage.clone()).unwrap();
        (Arc::new(core), storage, tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_database_and_uploads_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_data_dir(tmp.path().join("board"));
        let core = CoreState::open(config.clone()).unwrap();

        assert!(config.db_path().exists());
        assert!(config.uploads_dir().is_dir());
        let conn = core.open_db().unwrap();
        assert_eq!(db::count_tables(&conn).unwrap(), 6);
    }

    #[test]
    fn cascade_permits_follow_config() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::with_data_dir(tmp.path());
        config.cascade_concurrency = 3;
        let core = CoreState::open(config).unwrap();
        assert_eq!(core.cascade_permits().available_permits(), 3);
    }
}
