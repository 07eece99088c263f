//! Authorization record lifecycle: add, update, enable/disable, delete, read.

use crate::error::AuthError;
use crate::record::{build_key, normalize_target, AuthRecord, ProxyCategory};
use crate::signer::Signer;
use crate::store::RecordStore;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Parameters of a new authorization record.
#[derive(Debug, Clone)]
pub struct NewAuthorization {
    pub proxy_name: String,
    pub proxy_type: ProxyCategory,
    pub remote_port: u16,
    /// Defaults to the proxy name for domain-based categories
    pub subdomain: Option<String>,
    pub valid_until: i64,
    pub memo: String,
    /// Replace an existing record with the same id instead of failing
    pub overwrite: bool,
}

/// Administrative operations over authorization records.
#[derive(Clone)]
pub struct Authorizations {
    store: Arc<dyn RecordStore>,
    signer: Arc<Signer>,
}

impl Authorizations {
    pub fn new(store: Arc<dyn RecordStore>, signer: Arc<Signer>) -> Self {
        Self { store, signer }
    }

    /// Provision a new record with fresh secret material.
    #[instrument(skip_all, fields(proxy_name = %request.proxy_name, proxy_type = %request.proxy_type))]
    pub fn add(&self, request: NewAuthorization) -> Result<AuthRecord, AuthError> {
        let proxy_name = request.proxy_name.trim().to_string();
        if proxy_name.is_empty() {
            return Err(AuthError::BadRequest("proxy_name must not be empty".into()));
        }

        let subdomain = request
            .subdomain
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| proxy_name.clone());
        let (remote_port, subdomain) =
            normalize_target(request.proxy_type, request.remote_port, &subdomain);

        let mut record = AuthRecord {
            id: build_key(request.proxy_type, &proxy_name, remote_port, &subdomain),
            proxy_name,
            proxy_type: request.proxy_type,
            remote_port,
            subdomain,
            valid_until: request.valid_until,
            memo: request.memo,
            secret: generate_secret(),
            signature: String::new(),
            disabled: false,
        };
        record.signature = self.signature_for(&record);

        if request.overwrite {
            self.store.put(&record)?;
        } else if !self.store.insert_new(&record)? {
            return Err(AuthError::Conflict(record.id));
        }

        info!(id = %record.id, valid_until = record.valid_until, "Authorization added");
        Ok(record)
    }

    /// Change expiry and memo, re-signing over the new expiry.
    #[instrument(skip(self, memo))]
    pub fn update(&self, id: &str, valid_until: i64, memo: &str) -> Result<AuthRecord, AuthError> {
        let signer = &self.signer;
        let record = self
            .store
            .modify(id, &|record: &mut AuthRecord| {
                record.valid_until = valid_until;
                record.memo = memo.to_string();
                record.signature = signer.sign(&record.canonical(), &record.secret);
            })?
            .ok_or_else(|| AuthError::NotFound(id.to_string()))?;

        info!(id, valid_until, "Authorization updated");
        Ok(record)
    }

    /// Re-enable a record. The signature is left untouched.
    pub fn enable(&self, id: &str) -> Result<AuthRecord, AuthError> {
        self.set_disabled(id, false)
    }

    /// Disable a record. The signature is left untouched.
    pub fn disable(&self, id: &str) -> Result<AuthRecord, AuthError> {
        self.set_disabled(id, true)
    }

    fn set_disabled(&self, id: &str, disabled: bool) -> Result<AuthRecord, AuthError> {
        let record = self
            .store
            .modify(id, &|record: &mut AuthRecord| record.disabled = disabled)?
            .ok_or_else(|| AuthError::NotFound(id.to_string()))?;

        info!(id, disabled, "Authorization state changed");
        Ok(record)
    }

    /// Remove a record. Absent ids are not an error.
    pub fn delete(&self, id: &str) -> Result<(), AuthError> {
        self.store.delete(id)?;
        info!(id, "Authorization deleted");
        Ok(())
    }

    /// Fetch a single record.
    pub fn get(&self, id: &str) -> Result<AuthRecord, AuthError> {
        self.store
            .get(id)?
            .ok_or_else(|| AuthError::NotFound(id.to_string()))
    }

    /// Every stored record.
    pub fn list(&self) -> Result<Vec<AuthRecord>, AuthError> {
        Ok(self.store.list()?)
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<usize, AuthError> {
        Ok(self.store.count()?)
    }

    /// Signature a record's current signed fields should carry.
    pub fn signature_for(&self, record: &AuthRecord) -> String {
        self.signer.sign(&record.canonical(), &record.secret)
    }
}

/// Fresh, unguessable secret material for a record.
fn generate_secret() -> String {
    Uuid::new_v4().to_string()
}
