//! In-memory record store.

use super::{Mutation, RecordStore, StoreError};
use crate::record::AuthRecord;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Record store kept entirely in memory, for tests or when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, AuthRecord>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, AuthRecord>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::Backend("record lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, AuthRecord>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Backend("record lock poisoned".into()))
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<AuthRecord>, StoreError> {
        Ok(self.read()?.get(id).cloned())
    }

    fn put(&self, record: &AuthRecord) -> Result<(), StoreError> {
        self.write()?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn insert_new(&self, record: &AuthRecord) -> Result<bool, StoreError> {
        let mut records = self.write()?;
        if records.contains_key(&record.id) {
            return Ok(false);
        }
        records.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    fn modify(&self, id: &str, mutate: Mutation<'_>) -> Result<Option<AuthRecord>, StoreError> {
        let mut records = self.write()?;
        Ok(records.get_mut(id).map(|record| {
            mutate(record);
            record.clone()
        }))
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.write()?.remove(id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<AuthRecord>, StoreError> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }
}
