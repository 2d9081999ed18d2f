// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::default_info;
use tempfile::tempdir;

#[test]
fn check_data_dirs_drops_unusable_directories() {
    let root = tempdir().unwrap();
    let good = root.path().join("data-a");
    // A regular file where a directory is expected is unusable.
    let bad = root.path().join("data-b");
    std::fs::write(&bad, b"not a directory").unwrap();

    let usable = check_data_dirs(&[good.clone(), bad]).unwrap();
    assert_eq!(usable, vec![good]);
}

#[test]
fn no_usable_directories_fails_startup() {
    let root = tempdir().unwrap();
    let bad = root.path().join("data");
    std::fs::write(&bad, b"not a directory").unwrap();

    let err = check_data_dirs(&[bad]).unwrap_err();
    assert!(matches!(err, StorageError::NoDirectories), "got {err:?}");
}

#[test]
fn fresh_directory_is_formatted_on_recovery() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data");
    let storage = DiskStorage::open(vec![dir.clone()]).unwrap();

    storage
        .recover_transition(&default_info(42), StartupOption::Regular)
        .unwrap();
    assert!(dir.join("current").join("VERSION").exists());
    assert_eq!(storage.info().layout_version, LAYOUT_VERSION);

    let ns_dir = storage
        .recover_namespace(&default_info(42), StartupOption::Regular)
        .unwrap();
    assert!(ns_dir.join("VERSION").exists());
    assert!(storage.has_namespace(NamespaceId(42)));
}

#[test]
fn adopted_storage_id_survives_a_reopen() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data");
    {
        let storage = DiskStorage::open(vec![dir.clone()]).unwrap();
        storage
            .recover_transition(&default_info(42), StartupOption::Regular)
            .unwrap();
        assert!(!storage.storage_id().is_set());
        storage.adopt_storage_id(&StorageId::new("DS-17-host-50010")).unwrap();
    }
    let storage = DiskStorage::open(vec![dir]).unwrap();
    assert_eq!(storage.storage_id(), StorageId::new("DS-17-host-50010"));
}

#[test]
fn foreign_layout_version_is_rejected() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data");
    {
        let storage = DiskStorage::open(vec![dir.clone()]).unwrap();
        storage
            .recover_transition(&default_info(42), StartupOption::Regular)
            .unwrap();
    }
    // A future format appears on disk.
    let version = dir.join("current").join("VERSION");
    let text = std::fs::read_to_string(&version).unwrap();
    let rewritten = text.replace(&LAYOUT_VERSION.to_string(), &(LAYOUT_VERSION - 5).to_string());
    std::fs::write(&version, rewritten).unwrap();

    let storage = DiskStorage::open(vec![dir]).unwrap();
    let err = storage
        .recover_transition(&default_info(42), StartupOption::Regular)
        .unwrap_err();
    assert!(matches!(err, StorageError::Layout { .. }), "got {err:?}");
}

#[test]
fn rollback_restores_the_previous_tree() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data");

    // Simulate an upgraded node: current/ carries a foreign layout,
    // previous/ holds the state we want back.
    {
        let storage = DiskStorage::open(vec![dir.clone()]).unwrap();
        storage
            .recover_transition(&default_info(42), StartupOption::Regular)
            .unwrap();
        storage.adopt_storage_id(&StorageId::new("DS-keep")).unwrap();
    }
    std::fs::rename(dir.join("current"), dir.join("previous")).unwrap();
    std::fs::create_dir_all(dir.join("current")).unwrap();
    std::fs::write(
        dir.join("current").join("VERSION"),
        format!("storage_id = \"DS-new\"\nlayout_version = {}\nc_time = 1\n", LAYOUT_VERSION - 5),
    )
    .unwrap();

    let storage = DiskStorage::open(vec![dir.clone()]).unwrap();
    storage
        .recover_transition(&default_info(42), StartupOption::Rollback)
        .unwrap();
    assert!(!dir.join("previous").exists());
    // Recovery re-reads the restored VERSION, not the pre-rollback one.
    assert_eq!(storage.storage_id(), StorageId::new("DS-keep"));

    drop(storage);
    let reopened = DiskStorage::open(vec![dir]).unwrap();
    assert_eq!(reopened.storage_id(), StorageId::new("DS-keep"));
}

#[test]
fn remove_namespace_deletes_the_tree_idempotently() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data");
    let storage = DiskStorage::open(vec![dir.clone()]).unwrap();
    storage
        .recover_transition(&default_info(42), StartupOption::Regular)
        .unwrap();
    let ns_dir = storage
        .recover_namespace(&default_info(42), StartupOption::Regular)
        .unwrap();
    assert!(ns_dir.exists());

    storage.remove_namespace(NamespaceId(42)).unwrap();
    assert!(!ns_dir.exists());
    assert!(!storage.has_namespace(NamespaceId(42)));
    // Second removal is a no-op.
    storage.remove_namespace(NamespaceId(42)).unwrap();
}

#[test]
fn namespace_directory_owned_by_another_namespace_is_corrupt() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data");
    let storage = DiskStorage::open(vec![dir.clone()]).unwrap();
    storage
        .recover_transition(&default_info(42), StartupOption::Regular)
        .unwrap();
    storage
        .recover_namespace(&default_info(42), StartupOption::Regular)
        .unwrap();

    // Same directory, different namespace id in its VERSION.
    let version = dir.join("current").join("NS-42").join("VERSION");
    let text = std::fs::read_to_string(&version).unwrap();
    std::fs::write(&version, text.replace("42", "43")).unwrap();

    drop(storage);
    let reopened = DiskStorage::open(vec![dir]).unwrap();
    reopened
        .recover_transition(&default_info(42), StartupOption::Regular)
        .unwrap();
    let err = reopened
        .recover_namespace(&default_info(42), StartupOption::Regular)
        .unwrap_err();
    assert!(matches!(err, StorageError::Corrupt(..)), "got {err:?}");
}

#[test]
fn second_open_of_a_locked_directory_fails() {
    let root = tempdir().unwrap();
    let dir = root.path().join("data");
    let _storage = DiskStorage::open(vec![dir.clone()]).unwrap();

    let err = DiskStorage::open(vec![dir]).err().expect("lock must be held");
    assert!(matches!(err, StorageError::Disk(..)), "got {err:?}");
}

#[test]
fn simulated_storage_synthesizes_from_the_handshake() {
    let storage = SimulatedStorage::new();
    let info = default_info(42);
    storage.recover_transition(&info, StartupOption::Regular).unwrap();
    assert_eq!(storage.info().layout_version, info.layout_version);
    assert_eq!(storage.info().c_time, info.c_time);

    storage.recover_namespace(&info, StartupOption::Regular).unwrap();
    assert!(storage.has_namespace(NamespaceId(42)));
    storage.remove_namespace(NamespaceId(42)).unwrap();
    assert!(!storage.has_namespace(NamespaceId(42)));
}
