//! Snapshot Persistence Tests
//!
//! A persistent `DocumentAdapter` must:
//! - Write one snapshot per entity on close
//! - Restore every record, engine-assigned ids included, on reopen
//! - Refuse work once closed
//! - Leave snapshots untouched when flushing on close is disabled

use std::fs;

use rawql::adapter::{DocumentAdapter, DocumentConfig};
use rawql::core::QueryEngine;
use rawql::request::Request;
use serde_json::{json, Value};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn open(temp: &TempDir, entities: &[&str]) -> QueryEngine {
    let adapter = DocumentAdapter::open(DocumentConfig::persistent(temp.path())).unwrap();
    for entity in entities {
        adapter.register(entity);
    }
    QueryEngine::new(adapter)
}

// =============================================================================
// Reopen
// =============================================================================

/// Records created in one session are visible in the next.
#[tokio::test]
async fn test_records_survive_reopen() {
    let temp = TempDir::new().unwrap();

    let created_id = {
        let engine = open(&temp, &["notes"]);
        let created = engine
            .execute(Request::create("notes", json!({"body": "first"})))
            .await;
        assert!(created.status, "{}", created.message);
        engine
            .execute(Request::create("notes", json!({"_id": "n2", "body": "second"})))
            .await;
        engine.close().await.unwrap();

        created.item().unwrap()["_id"].as_str().unwrap().to_string()
    };

    assert!(temp.path().join("notes.json").exists());

    let engine = open(&temp, &[]);
    let fetched = engine.execute(Request::get("notes", created_id.as_str())).await;
    assert_eq!(fetched.item().unwrap()["body"], "first");

    let count = engine.execute(Request::count("notes")).await;
    assert_eq!(count.item(), Some(&json!(2)));
}

/// Snapshot files are plain JSON arrays.
#[tokio::test]
async fn test_snapshot_format() {
    let temp = TempDir::new().unwrap();

    let engine = open(&temp, &["tags"]);
    engine
        .execute(Request::create("tags", json!({"_id": "t1", "label": "rust"})))
        .await;
    engine.close().await.unwrap();

    let raw = fs::read_to_string(temp.path().join("tags.json")).unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value, json!([{"_id": "t1", "label": "rust"}]));
}

/// Deletes are persisted as well.
#[tokio::test]
async fn test_delete_survives_reopen() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("users.json"),
        json!([{"_id": "u1"}, {"_id": "u2"}]).to_string(),
    )
    .unwrap();

    let engine = open(&temp, &[]);
    let deleted = engine.execute(Request::delete("users", "u1")).await;
    assert!(deleted.status, "{}", deleted.message);
    engine.close().await.unwrap();

    let engine = open(&temp, &[]);
    let listed = engine.execute(Request::list("users")).await;
    assert_eq!(listed.items().unwrap(), &[json!({"_id": "u2"})]);
}

// =============================================================================
// Close Semantics
// =============================================================================

/// A closed adapter answers every request with a failure envelope.
#[tokio::test]
async fn test_closed_adapter_fails_requests() {
    let temp = TempDir::new().unwrap();
    let engine = open(&temp, &["users"]);
    engine.close().await.unwrap();

    let response = engine.execute(Request::list("users")).await;
    assert!(!response.status);
    assert!(response.data.is_none());
    assert_eq!(response.message, "adapter is closed");

    assert!(engine.close().await.is_ok());
}

/// With flushing disabled, close leaves the directory as it was.
#[tokio::test]
async fn test_close_without_flush() {
    let temp = TempDir::new().unwrap();
    let config = DocumentConfig {
        flush_on_close: false,
        ..DocumentConfig::persistent(temp.path())
    };

    let adapter = DocumentAdapter::open(config).unwrap();
    adapter.register("drafts");
    let engine = QueryEngine::new(adapter);
    engine
        .execute(Request::create("drafts", json!({"body": "unsaved"})))
        .await;
    engine.close().await.unwrap();

    assert!(!temp.path().join("drafts.json").exists());
}

/// A corrupt snapshot fails the open instead of loading partial data.
#[test]
fn test_corrupt_snapshot_fails_open() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("users.json"), "not json").unwrap();

    let err = match DocumentAdapter::open(DocumentConfig::persistent(temp.path())) {
        Ok(_) => panic!("corrupt snapshot was loaded"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("Corrupt snapshot"));
}
