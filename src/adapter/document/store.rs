//! Snapshot persistence
//!
//! One file per entity: `<dir>/<entity>.json`, holding a JSON array of
//! records. Writes go to `<entity>.json.tmp`, are fsynced, then renamed
//! over the live file, so a crash leaves either the old or the new
//! snapshot, never a torn one.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::registry::{Document, EntityRegistry};
use crate::core::error::{QueryError, QueryResult};
use crate::observability::ObservationScope;

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every `*.json` snapshot. A missing directory is created and
    /// yields an empty registry.
    pub fn load(&self) -> QueryResult<EntityRegistry> {
        let dir = self.dir.display().to_string();
        let scope = ObservationScope::with_fields("SNAPSHOT_LOAD", &[("dir", dir.as_str())]);

        match self.read_all() {
            Ok(registry) => {
                let entities = registry.names().count().to_string();
                scope.complete_with_fields(&[("entities", entities.as_str())]);
                Ok(registry)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// Write every collection of `registry`
    pub fn save(&self, registry: &EntityRegistry) -> QueryResult<()> {
        let dir = self.dir.display().to_string();
        let scope = ObservationScope::with_fields("SNAPSHOT_FLUSH", &[("dir", dir.as_str())]);

        let result = registry.iter().try_for_each(|(entity, collection)| {
            self.write_entity(entity.as_str(), collection.documents())
        });

        match result {
            Ok(()) => {
                scope.complete();
                Ok(())
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn read_all(&self) -> QueryResult<EntityRegistry> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error("create", &self.dir, e))?;

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| io_error("read", &self.dir, e))? {
            let path = entry.map_err(|e| io_error("read", &self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = EntityRegistry::new();
        for path in paths {
            let Some(entity) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let documents = read_documents(&path)?;
            registry.register_with(entity, documents);
        }
        Ok(registry)
    }

    fn write_entity(&self, entity: &str, documents: &[Document]) -> QueryResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error("create", &self.dir, e))?;

        let path = self.dir.join(format!("{}.{}", entity, EXTENSION));
        let tmp = self.dir.join(format!("{}.{}.tmp", entity, EXTENSION));

        let body = serde_json::to_vec_pretty(documents)
            .map_err(|e| QueryError::backend(format!("Failed to encode {}: {}", entity, e)))?;

        let mut file = File::create(&tmp).map_err(|e| io_error("create", &tmp, e))?;
        file.write_all(&body)
            .map_err(|e| io_error("write", &tmp, e))?;
        file.sync_all().map_err(|e| io_error("fsync", &tmp, e))?;

        fs::rename(&tmp, &path).map_err(|e| io_error("rename", &path, e))?;
        fsync_dir(&self.dir)
    }
}

fn read_documents(path: &Path) -> QueryResult<Vec<Document>> {
    let raw = fs::read(path).map_err(|e| io_error("read", path, e))?;
    let value: Value = serde_json::from_slice(&raw).map_err(|e| {
        QueryError::backend(format!("Corrupt snapshot {}: {}", path.display(), e))
    })?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(QueryError::backend(format!(
                    "Corrupt snapshot {}: expected objects, found {}",
                    path.display(),
                    other
                ))),
            })
            .collect(),
        _ => Err(QueryError::backend(format!(
            "Corrupt snapshot {}: expected an array",
            path.display()
        ))),
    }
}

fn fsync_dir(path: &Path) -> QueryResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| io_error("open", path, e))?;
    dir.sync_all().map_err(|e| io_error("fsync", path, e))
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> QueryError {
    QueryError::backend(format!("Failed to {} {}: {}", action, path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_dir_is_created() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().join("data"));

        let registry = store.load().unwrap();
        assert_eq!(registry.names().count(), 0);
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path());

        let mut registry = EntityRegistry::new();
        registry.register_with("users", vec![doc(json!({"_id": "u1", "name": "Ada"}))]);
        registry.register("orders");
        store.save(&registry).unwrap();

        assert!(temp.path().join("users.json").exists());
        assert!(!temp.path().join("users.json.tmp").exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.collection("users").unwrap().documents()[0]["name"], "Ada");
        assert!(loaded.collection("orders").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("users.json"), "{\"not\": \"an array\"}").unwrap();

        let err = SnapshotStore::new(temp.path()).load().unwrap_err();
        assert!(err.to_string().contains("expected an array"));
    }

    #[test]
    fn test_other_files_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes.txt"), "hello").unwrap();

        let registry = SnapshotStore::new(temp.path()).load().unwrap();
        assert!(!registry.contains("notes"));
    }
}
