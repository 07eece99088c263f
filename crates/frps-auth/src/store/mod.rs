//! Authorization record storage.
//!
//! The service only needs a narrow contract from its key/value backend:
//! point reads, writes and deletes, a full scan, and two atomic
//! read-modify-write primitives. Every record lives in a single bucket
//! chosen when the store is opened.

mod disk;
mod memory;

pub use disk::SledStore;
pub use memory::MemoryStore;

use crate::config::StorageConfig;
use crate::record::AuthRecord;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Record mutation applied inside a store transaction.
///
/// Backends may run it more than once when a transaction is retried, so it
/// must only depend on the record it is handed.
pub type Mutation<'a> = &'a (dyn Fn(&mut AuthRecord) + Send + Sync);

/// Key/value contract for authorization records.
pub trait RecordStore: Send + Sync {
    /// Fetch a record by id.
    fn get(&self, id: &str) -> Result<Option<AuthRecord>, StoreError>;

    /// Write a record under its id, replacing any existing value.
    fn put(&self, record: &AuthRecord) -> Result<(), StoreError>;

    /// Write a record only if its id is free. Returns `false` when the id is taken.
    fn insert_new(&self, record: &AuthRecord) -> Result<bool, StoreError>;

    /// Atomically load, mutate and write back a record.
    ///
    /// Returns the updated record, or `None` if the id is absent.
    fn modify(&self, id: &str, mutate: Mutation<'_>) -> Result<Option<AuthRecord>, StoreError>;

    /// Remove a record. Removing an absent id is not an error.
    fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Every record in the bucket. Empty bucket yields an empty vector.
    fn list(&self) -> Result<Vec<AuthRecord>, StoreError>;

    /// Number of records in the bucket.
    fn count(&self) -> Result<usize, StoreError>;

    /// Make buffered writes durable.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Open the configured store: on-disk when persistence is enabled, otherwise in memory.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    if config.persist {
        info!(path = ?config.path, bucket = %config.bucket, "Opening on-disk record store");
        Ok(Arc::new(SledStore::open(&config.path, &config.bucket)?))
    } else {
        warn!("Persistence disabled, using in-memory storage (records will be lost on restart)");
        Ok(Arc::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_memory() {
        let config = StorageConfig {
            persist: false,
            ..StorageConfig::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_open_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            path: dir.path().join("db"),
            bucket: "auth".into(),
            persist: true,
        };
        let store = open_store(&config).unwrap();
        assert!(store.list().unwrap().is_empty());
        store.flush().unwrap();
    }
}
