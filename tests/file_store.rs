use std::fs;
use std::sync::Arc;

use chrono::Utc;
use passkey_rp::store::{CredentialRecord, CredentialStore, FileCredentialStore};
use tempfile::TempDir;

fn record(id: &[u8], version: u32) -> CredentialRecord {
    CredentialRecord {
        credential_id: id.to_vec(),
        public_key_algorithm: -7,
        public_key: vec![0x30, 0x59, 0x30, 0x13],
        authenticator_data: vec![0; 37],
        user_handle: Some(vec![7; 16]),
        registered_at: Utc::now(),
        version,
    }
}

#[test]
fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let store = FileCredentialStore::open(dir.path()).unwrap();
        assert!(store.put_if_absent(record(b"first", 1)).unwrap());
        assert!(store.put_if_absent(record(b"second", 1)).unwrap());
        assert!(!store.put_if_absent(record(b"first", 1)).unwrap());
    }

    let reopened = FileCredentialStore::open(dir.path()).unwrap();
    assert_eq!(reopened.len().unwrap(), 2);
    let first = reopened.get(b"first").unwrap().unwrap();
    assert_eq!(first.public_key_algorithm, -7);
    assert_eq!(first.public_key, vec![0x30, 0x59, 0x30, 0x13]);
    assert_eq!(first.user_handle, Some(vec![7; 16]));
    assert!(reopened.get(b"third").unwrap().is_none());
}

#[test]
fn test_replacement_is_persisted() {
    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::open(dir.path()).unwrap();
    store.put(record(b"credential", 1)).unwrap();
    let replaced = store.put(record(b"credential", 2)).unwrap();
    assert_eq!(replaced.map(|r| r.version), Some(1));
    drop(store);

    let reopened = FileCredentialStore::open(dir.path()).unwrap();
    assert_eq!(reopened.len().unwrap(), 1);
    assert_eq!(reopened.get(b"credential").unwrap().unwrap().version, 2);
}

#[test]
fn test_corrupt_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    {
        let store = FileCredentialStore::open(dir.path()).unwrap();
        store.put(record(b"good", 1)).unwrap();
    }
    fs::write(dir.path().join("garbage.json"), b"{ not json").unwrap();
    fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let reopened = FileCredentialStore::open(dir.path()).unwrap();
    assert_eq!(reopened.len().unwrap(), 1);
    assert!(reopened.get(b"good").unwrap().is_some());
}

#[test]
fn test_open_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = FileCredentialStore::open(&nested).unwrap();
    assert!(store.is_empty().unwrap());
    assert!(nested.is_dir());
    assert_eq!(store.dir(), nested.as_path());
}

#[test]
fn test_versioned_puts_are_persisted() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileCredentialStore::open(dir.path()).unwrap());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.put_versioned(record(b"credential", 1)).unwrap().0)
        })
        .collect();
    let mut versions: Vec<u32> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().version)
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u32>>());
    drop(store);

    let reopened = FileCredentialStore::open(dir.path()).unwrap();
    assert_eq!(reopened.len().unwrap(), 1);
    assert_eq!(reopened.get(b"credential").unwrap().unwrap().version, 8);
}
