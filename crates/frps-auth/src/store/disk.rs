//! On-disk record store backed by sled.

use super::{Mutation, RecordStore, StoreError};
use crate::record::AuthRecord;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use std::path::Path;
use tracing::debug;

/// Record store persisting JSON-encoded records in one sled tree.
#[derive(Clone)]
pub struct SledStore {
    /// Keeps the database open for as long as the tree is in use
    db: sled::Db,
    records: sled::Tree,
}

impl SledStore {
    /// Open or create the database at `path` and select `bucket`.
    pub fn open<P: AsRef<Path>>(path: P, bucket: &str) -> Result<Self, StoreError> {
        Self::with_db(sled::open(path)?, bucket)
    }

    /// Select `bucket` in an already open database.
    ///
    /// sled holds an exclusive lock on its directory, so further buckets of
    /// the same database must share one handle.
    pub fn with_db(db: sled::Db, bucket: &str) -> Result<Self, StoreError> {
        let records = db.open_tree(bucket)?;
        Ok(Self { db, records })
    }

    /// Temporary database, removed when dropped.
    pub fn temporary(bucket: &str) -> Result<Self, StoreError> {
        Self::with_db(sled::Config::new().temporary(true).open()?, bucket)
    }

    fn decode(raw: &[u8]) -> Result<AuthRecord, StoreError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

impl RecordStore for SledStore {
    fn get(&self, id: &str) -> Result<Option<AuthRecord>, StoreError> {
        self.records
            .get(id)?
            .map(|raw| Self::decode(&raw))
            .transpose()
    }

    fn put(&self, record: &AuthRecord) -> Result<(), StoreError> {
        let value = serde_json::to_vec(record)?;
        self.records.insert(record.id.as_str(), value)?;
        Ok(())
    }

    fn insert_new(&self, record: &AuthRecord) -> Result<bool, StoreError> {
        let value = serde_json::to_vec(record)?;
        let swapped = self
            .records
            .compare_and_swap(record.id.as_str(), None::<&[u8]>, Some(value))?;
        Ok(swapped.is_ok())
    }

    fn modify(&self, id: &str, mutate: Mutation<'_>) -> Result<Option<AuthRecord>, StoreError> {
        let result = self.records.transaction(
            |tx| -> ConflictableTransactionResult<Option<AuthRecord>, StoreError> {
                let Some(raw) = tx.get(id)? else {
                    return Ok(None);
                };
                let mut record = Self::decode(&raw).map_err(ConflictableTransactionError::Abort)?;
                mutate(&mut record);
                let value = serde_json::to_vec(&record)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                tx.insert(id, value)?;
                Ok(Some(record))
            },
        );

        match result {
            Ok(record) => Ok(record),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.records.remove(id)?.is_none() {
            debug!(id, "Delete of absent record");
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<AuthRecord>, StoreError> {
        self.records
            .iter()
            .values()
            .map(|raw| Self::decode(&raw?))
            .collect()
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let bytes = self.db.flush()?;
        debug!(bytes, "Flushed record store");
        Ok(())
    }
}
