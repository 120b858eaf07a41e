mod support;

use serde_json::{Map, Value};
use std::sync::Arc;
use support::{keys, read_rows, sample_tasks, write_csv, write_keys_file};
use taskseal_crypto::KeySlot;
use taskseal_csv::{
    decrypt_task_content, set_keys_in_settings, CodecError, CsvCodec, ErrorKind, KeyStore,
    TaskPayload, TASK_HEADERS,
};

#[test]
fn loading_a_keys_file_installs_keys() {
    let dir = tempfile::tempdir().unwrap();
    let keys_file = write_keys_file(dir.path());

    let store = KeyStore::new();
    assert!(!store.is_loaded());
    set_keys_in_settings(&store, &keys_file).unwrap();
    assert!(store.is_loaded());

    let current = store.current().unwrap();
    assert_eq!(
        current.inputs().encryption_public(),
        keys().inputs().encryption_public()
    );
}

#[test]
fn incomplete_keys_file_leaves_store_unloaded() {
    let dir = tempfile::tempdir().unwrap();
    let keys_file = write_keys_file(dir.path());

    let raw = std::fs::read_to_string(&keys_file).unwrap();
    let mut map: Map<String, Value> = serde_json::from_str(&raw).unwrap();
    let dropped = KeySlot::all().nth(5).unwrap().identifier();
    map.remove(&dropped).unwrap();
    std::fs::write(&keys_file, serde_json::to_string_pretty(&map).unwrap()).unwrap();

    let store = KeyStore::new();
    let err = store.set_keys_in_settings(&keys_file).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyFileCorrupt);
    assert!(err.to_string().contains(&dropped));
    assert!(!store.is_loaded());
}

#[test]
fn failed_reload_keeps_previous_keys() {
    let dir = tempfile::tempdir().unwrap();
    let keys_file = write_keys_file(dir.path());
    let store = KeyStore::from_keys_file(&keys_file).unwrap();
    let before = store.current().unwrap();

    std::fs::write(&keys_file, "{ not json").unwrap();
    assert!(store.set_keys_in_settings(&keys_file).is_err());

    let after = store.current().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
}

#[test]
fn clear_unloads_keys() {
    let store = KeyStore::new();
    store.set_keys(keys().clone());
    assert!(store.is_loaded());
    store.clear();
    assert!(matches!(store.current(), Err(CodecError::KeysNotLoaded)));
}

#[test]
fn decrypts_a_single_task_row() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("tasks.csv");
    let sealed = dir.path().join("sealed.csv");
    write_csv(&plain, &TASK_HEADERS, &sample_tasks());
    CsvCodec::new().encrypt_tasks(&plain, &sealed, keys()).unwrap();

    let store = KeyStore::new();
    store.set_keys(keys().clone());

    let (_, rows) = read_rows(&sealed);
    for (sealed_row, expected) in rows.iter().zip(sample_tasks()) {
        let payload = decrypt_task_content(&store, &sealed_row[1], &sealed_row[2]).unwrap();
        assert_eq!(
            payload,
            TaskPayload {
                content: expected[2].clone(),
                task_type: expected[1].clone(),
            }
        );
    }

    // Signature from a different row.
    let err = decrypt_task_content(&store, &rows[0][1], &rows[1][2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureVerification);
}
