use std::collections::HashMap;
use std::sync::RwLock;

use super::{CredentialRecord, CredentialStore, StoreError};

/// Process-local store; contents are lost on restart
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<Vec<u8>, CredentialRecord>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn put(&self, record: CredentialRecord) -> Result<Option<CredentialRecord>, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        Ok(records.insert(record.credential_id.clone(), record))
    }

    fn put_if_absent(&self, record: CredentialRecord) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        if records.contains_key(&record.credential_id) {
            return Ok(false);
        }
        records.insert(record.credential_id.clone(), record);
        Ok(true)
    }

    fn put_versioned(
        &self,
        mut record: CredentialRecord,
    ) -> Result<(CredentialRecord, Option<CredentialRecord>), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(previous) = records.get(&record.credential_id) {
            record.version = previous.version.saturating_add(1);
        }
        let replaced = records.insert(record.credential_id.clone(), record.clone());
        Ok((record, replaced))
    }

    fn get(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(credential_id).cloned())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.len())
    }
}
