// tests/state_store.rs
use chrono::NaiveDate;
use std::fs;

use neighborhood_monitor::state::PersistedItem;
use neighborhood_monitor::{Error, FileStateStore, PersistedState, SourceKind, StateStore};

fn sample() -> PersistedState {
    let mut s = PersistedState::default();
    s.run_date = NaiveDate::from_ymd_opt(2026, 3, 1);
    s.items.insert(
        "granicus:901".into(),
        PersistedItem {
            first_seen: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            date: NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(),
            source: SourceKind::Granicus,
        },
    );
    s
}

#[test]
fn saved_state_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("nested/state/items.json"));
    store.save(&sample()).unwrap();

    assert_eq!(store.try_load().unwrap(), Some(sample()));
    let raw = fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("\"version\": 1"));
    assert!(raw.contains("\"first_seen\": \"2026-02-14\""));
    assert!(raw.contains("\"source\": \"granicus\""));

    // No temp file left next to the state.
    let leftovers: Vec<_> = fs::read_dir(store.path().parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn missing_file_is_a_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStateStore::new(dir.path().join("items.json"));
    assert_eq!(store.try_load().unwrap(), None);
    assert!(store.load().items.is_empty());
}

#[test]
fn corrupt_file_degrades_to_empty_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.json");
    fs::write(&path, "{\"version\": 1, \"items\": {").unwrap();

    let store = FileStateStore::new(&path);
    assert!(matches!(store.try_load(), Err(Error::StateCorrupt { .. })));
    assert_eq!(store.load(), PersistedState::default());
}

#[test]
fn unknown_version_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.json");
    fs::write(&path, r#"{"version": 7, "items": {}}"#).unwrap();
    let store = FileStateStore::new(&path);
    assert!(matches!(store.try_load(), Err(Error::StateCorrupt { .. })));
}
