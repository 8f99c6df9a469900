//! Integration tests for the SQLite save/load round-trip.

use serde_json::json;
use tempfile::TempDir;

use traject::session::{Session, SessionOptions};
use traject::types::{EntryType, ErrorCode};

// ============================================================================
// Round-Trip Laws
// ============================================================================

#[test]
fn full_round_trip_preserves_session() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("session.db");

    let mut session = Session::new();
    session.set("n", 42).unwrap();
    session
        .set("doc", json!({"pi": 3.5, "tags": ["a", "b"], "none": null}))
        .unwrap();
    session.write_artifact("f.bin", &[0x00, 0x01, 0x02]).unwrap();
    session
        .append("worker", EntryType::Custom, json!({"note": "checkpoint"}))
        .unwrap();
    assert_eq!(session.trajectory().len(), 5);

    session.save(&path).unwrap();
    let loaded = Session::load(&path).unwrap();

    // Identity and configuration.
    assert_eq!(loaded.session_id(), session.session_id());
    assert_eq!(loaded.max_artifact_size(), session.max_artifact_size());
    assert_eq!(loaded.state_version(), session.state_version());

    // State values come back with exact fidelity.
    assert_eq!(loaded.state(), session.state());

    // Trajectory: exact seq_nums, timestamps, attribution, and content.
    assert_eq!(loaded.trajectory(), session.trajectory());

    // Artifacts are byte-exact.
    assert_eq!(loaded.read_artifact("f.bin").unwrap(), &[0x00, 0x01, 0x02]);
    assert_eq!(loaded.list_artifacts(), session.list_artifacts());
}

#[test]
fn round_trip_of_a_round_trip_is_stable() {
    let tmp = TempDir::new().unwrap();
    let first_path = tmp.path().join("first.db");
    let second_path = tmp.path().join("second.db");

    let mut session = Session::new();
    session.set("k", json!([1, 2, 3])).unwrap();
    session.save(&first_path).unwrap();

    let loaded = Session::load(&first_path).unwrap();
    loaded.save(&second_path).unwrap();
    let reloaded = Session::load(&second_path).unwrap();

    assert_eq!(reloaded.session_id(), session.session_id());
    assert_eq!(reloaded.trajectory(), session.trajectory());
    assert_eq!(reloaded.state(), session.state());
}

#[test]
fn loaded_session_continues_working() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("session.db");

    let mut session = Session::with_options(SessionOptions {
        max_artifact_size: Some(64),
        ..Default::default()
    });
    session.set("count", 1).unwrap();
    session.save(&path).unwrap();
    let saved_len = session.trajectory_len();

    let mut loaded = Session::load(&path).unwrap();

    // Numbering continues where the file left off.
    let entry = loaded
        .append("worker", EntryType::Custom, json!({}))
        .unwrap();
    assert_eq!(entry.seq_num, saved_len + 1);

    // Versioning and limits survive too.
    assert_eq!(loaded.set("count", 2).unwrap(), 2);
    let err = loaded.write_artifact("big", &[0u8; 65]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArtifactTooLarge);
}

#[test]
fn empty_session_round_trips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty.db");

    let session = Session::new();
    session.save(&path).unwrap();
    let loaded = Session::load(&path).unwrap();

    assert_eq!(loaded.trajectory().len(), 1);
    assert_eq!(loaded.state_version(), 0);
    assert!(loaded.keys().is_empty());
    assert!(loaded.list_artifacts().is_empty());
}

#[test]
fn large_artifact_round_trips_byte_exact() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("blobs.db");

    let data: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let mut session = Session::new();
    session.write_artifact("blob", &data).unwrap();
    session.save(&path).unwrap();

    let loaded = Session::load(&path).unwrap();
    assert_eq!(loaded.read_artifact("blob").unwrap(), data.as_slice());
}

// ============================================================================
// Failure Modes
// ============================================================================

#[test]
fn load_of_missing_file_is_persistence_error() {
    let tmp = TempDir::new().unwrap();
    let err = Session::load(&tmp.path().join("nope.db")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PersistenceError);
}

#[test]
fn load_of_garbage_file_is_persistence_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("garbage.db");
    std::fs::write(&path, b"this is not a database").unwrap();

    let err = Session::load(&path).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PersistenceError);
}

#[test]
fn failed_save_leaves_existing_file_intact() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("session.db");

    let mut session = Session::new();
    session.set("k", "original").unwrap();
    session.save(&path).unwrap();

    // Saving to an unwritable location fails without touching anything.
    let bad_path = tmp.path().join("missing-dir").join("session.db");
    let err = session.save(&bad_path).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PersistenceError);

    // The earlier file still loads.
    let loaded = Session::load(&path).unwrap();
    assert_eq!(loaded.get("k"), Some(json!("original")));
}

#[test]
fn save_overwrite_replaces_previous_session() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("session.db");

    let mut first = Session::new();
    first.set("who", "first").unwrap();
    first.write_artifact("only-in-first", b"x").unwrap();
    first.save(&path).unwrap();

    let second = Session::new();
    second.save(&path).unwrap();

    let loaded = Session::load(&path).unwrap();
    assert_eq!(loaded.session_id(), second.session_id());
    assert!(!loaded.has("who"));
    assert!(loaded.list_artifacts().is_empty());
}
