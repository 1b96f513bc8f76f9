//! StateStore: redb-backed pipeline persistence.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PIPELINES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update a single pipeline record.
    pub fn put_pipeline(&self, pipeline: &Pipeline) -> StateResult<()> {
        let value = serde_json::to_vec(pipeline).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PIPELINES).map_err(map_err!(Table))?;
            table
                .insert(pipeline.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pipeline_id = %pipeline.id, "pipeline stored");
        Ok(())
    }

    /// Get a pipeline by ID.
    pub fn get_pipeline(&self, id: &str) -> StateResult<Option<Pipeline>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PIPELINES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let pipeline: Pipeline =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(pipeline))
            }
            None => Ok(None),
        }
    }

    /// List all stored pipelines, ordered by ID.
    pub fn list_pipelines(&self) -> StateResult<Vec<Pipeline>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PIPELINES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let pipeline: Pipeline =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(pipeline);
        }
        Ok(results)
    }

    /// Delete a pipeline by ID. Returns true if it existed.
    pub fn delete_pipeline(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(PIPELINES).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pipeline_id = %id, existed, "pipeline deleted");
        Ok(existed)
    }

    /// Replace the stored set with `pipelines` in a single write transaction.
    ///
    /// Records not present in `pipelines` are removed.
    pub fn replace_pipelines(&self, pipelines: &[Pipeline]) -> StateResult<usize> {
        let mut encoded = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let value = serde_json::to_vec(pipeline).map_err(map_err!(Serialize))?;
            encoded.push((pipeline.id.as_str(), value));
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PIPELINES).map_err(map_err!(Table))?;
            let stale: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    Some(key.value().to_string())
                })
                .collect();
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            for (id, value) in &encoded {
                table.insert(*id, value.as_slice()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = encoded.len(), "pipeline set replaced");
        Ok(encoded.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pipeline(id: &str, files: &[&str]) -> Pipeline {
        let components = files
            .iter()
            .map(|f| ComponentSpec::new(*f, ResourceRequirement::default()).unwrap())
            .collect();
        Pipeline::new(id, format!("pipeline {id}"), components)
    }

    #[test]
    fn pipeline_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let pipeline = test_pipeline("p1", &["loader.py", "trainer.py"]);

        store.put_pipeline(&pipeline).unwrap();
        let retrieved = store.get_pipeline("p1").unwrap();

        assert_eq!(retrieved, Some(pipeline));
    }

    #[test]
    fn pipeline_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_pipeline("nope").unwrap().is_none());
    }

    #[test]
    fn pipeline_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut pipeline = test_pipeline("p1", &["loader.py"]);
        store.put_pipeline(&pipeline).unwrap();

        pipeline.components[0].state = PlacementState::Assigned {
            node_id: "n1".to_string(),
        };
        pipeline.refresh_state();
        store.put_pipeline(&pipeline).unwrap();

        let retrieved = store.get_pipeline("p1").unwrap().unwrap();
        assert_eq!(retrieved.state, PipelineState::Placed);
        assert_eq!(retrieved.components[0].state.active_node(), Some("n1"));
        assert_eq!(store.list_pipelines().unwrap().len(), 1);
    }

    #[test]
    fn pipeline_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_pipeline(&test_pipeline("p1", &["a.py"])).unwrap();

        assert!(store.delete_pipeline("p1").unwrap());
        assert!(!store.delete_pipeline("p1").unwrap());
        assert!(store.get_pipeline("p1").unwrap().is_none());
    }

    #[test]
    fn replace_drops_records_not_in_set() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_pipeline(&test_pipeline("old", &["a.py"])).unwrap();

        let written = store
            .replace_pipelines(&[test_pipeline("p1", &["a.py"]), test_pipeline("p2", &["b.py"])])
            .unwrap();
        assert_eq!(written, 2);

        let ids: Vec<String> = store
            .list_pipelines()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn component_order_preserved() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_pipeline(&test_pipeline("p1", &["z.py", "a.py", "m.py"]))
            .unwrap();

        let names: Vec<String> = store
            .get_pipeline("p1")
            .unwrap()
            .unwrap()
            .components
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pipelines.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_pipeline(&test_pipeline("p1", &["trainer.py"])).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        let pipeline = store.get_pipeline("p1").unwrap();
        assert!(pipeline.is_some());
        assert_eq!(pipeline.unwrap().components[0].name, "trainer");
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_pipelines().unwrap().is_empty());
        assert!(!store.delete_pipeline("nope").unwrap());
        assert_eq!(store.replace_pipelines(&[]).unwrap(), 0);
    }
}
