use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use ring::digest;

use super::{CredentialRecord, CredentialStore, StoreError};
use crate::utils::encoding;

const RECORD_EXTENSION: &str = "json";

/// One JSON file per credential under a directory
///
/// Files are named by the SHA-256 of the credential id, which keeps names
/// short and filesystem-safe whatever the id length. All records are loaded at
/// open; writes go to a temporary file that is renamed into place, so a crash
/// never leaves a half-written record behind.
#[derive(Debug)]
pub struct FileCredentialStore {
    dir: PathBuf,
    index: RwLock<HashMap<Vec<u8>, CredentialRecord>>,
}

impl FileCredentialStore {
    /// Open (creating if needed) the store directory and load its records
    ///
    /// Unreadable or corrupt files are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created or listed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut index = HashMap::new();
        for record in load_all(&dir)? {
            index.insert(record.credential_id.clone(), record);
        }
        log::info!(
            "Loaded {} credential(s) from {}",
            index.len(),
            dir.display()
        );

        Ok(Self {
            dir,
            index: RwLock::new(index),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, credential_id: &[u8]) -> PathBuf {
        let hash = digest::digest(&digest::SHA256, credential_id);
        self.dir
            .join(format!("{}.{RECORD_EXTENSION}", encoding::to_hex(hash.as_ref())))
    }

    fn write_record(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let path = self.record_path(&record.credential_id);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                log::warn!("Could not remove {}: {cleanup}", tmp.display());
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<CredentialRecord, StoreError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn load_all(dir: &Path) -> Result<Vec<CredentialRecord>, StoreError> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }
        match read_record(&path) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("Skipping corrupt credential file {}: {e}", path.display());
            }
        }
    }
    Ok(records)
}

impl CredentialStore for FileCredentialStore {
    fn put(&self, record: CredentialRecord) -> Result<Option<CredentialRecord>, StoreError> {
        let mut index = self.index.write().map_err(|_| StoreError::Poisoned)?;
        self.write_record(&record)?;
        Ok(index.insert(record.credential_id.clone(), record))
    }

    fn put_if_absent(&self, record: CredentialRecord) -> Result<bool, StoreError> {
        let mut index = self.index.write().map_err(|_| StoreError::Poisoned)?;
        if index.contains_key(&record.credential_id) {
            return Ok(false);
        }
        self.write_record(&record)?;
        index.insert(record.credential_id.clone(), record);
        Ok(true)
    }

    fn put_versioned(
        &self,
        mut record: CredentialRecord,
    ) -> Result<(CredentialRecord, Option<CredentialRecord>), StoreError> {
        let mut index = self.index.write().map_err(|_| StoreError::Poisoned)?;
        if let Some(previous) = index.get(&record.credential_id) {
            record.version = previous.version.saturating_add(1);
        }
        self.write_record(&record)?;
        let replaced = index.insert(record.credential_id.clone(), record.clone());
        Ok((record, replaced))
    }

    fn get(&self, credential_id: &[u8]) -> Result<Option<CredentialRecord>, StoreError> {
        let index = self.index.read().map_err(|_| StoreError::Poisoned)?;
        Ok(index.get(credential_id).cloned())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let index = self.index.read().map_err(|_| StoreError::Poisoned)?;
        Ok(index.len())
    }
}
