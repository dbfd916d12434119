/// In-process document store backend
///
/// Keeps every document in an ordered map behind an async lock. Used by the
/// test suites and for local runs without a database. Supports simple fault
/// injection (offline mode, failing a chosen commit) so degraded paths can be
/// exercised.
use crate::{
    error::{ConsoleError, ConsoleResult},
    store::{
        batch::stage_writes, ChangeEvent, ChangeHub, DocPath, Document, DocumentStore, Fields,
        Query, WriteBatch,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, RwLock};

/// Default per-batch operation limit
pub const DEFAULT_MAX_BATCH_OPS: usize = 500;

#[derive(Debug, Default)]
struct FaultState {
    offline: bool,
    /// Commit number (1-based, counted from arming) that fails once
    fail_commit_at: Option<usize>,
    commits_since_armed: usize,
    /// Operation count of every successful commit
    commit_sizes: Vec<usize>,
}

/// Memory-backed document store
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocPath, Fields>>,
    hub: ChangeHub,
    max_batch_ops: usize,
    faults: parking_lot::Mutex<FaultState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_batch_ops(DEFAULT_MAX_BATCH_OPS)
    }

    pub fn with_max_batch_ops(max_batch_ops: usize) -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            hub: ChangeHub::new(),
            max_batch_ops,
            faults: parking_lot::Mutex::new(FaultState::default()),
        }
    }

    /// Simulate the store being unreachable
    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().offline = offline;
    }

    /// Make the `n`th commit from now fail once with `StoreUnavailable`
    pub fn fail_commit_at(&self, n: usize) {
        let mut faults = self.faults.lock();
        faults.fail_commit_at = Some(n);
        faults.commits_since_armed = 0;
    }

    /// Operation counts of successful commits, oldest first
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.faults.lock().commit_sizes.clone()
    }

    pub fn clear_commit_log(&self) {
        self.faults.lock().commit_sizes.clear();
    }

    /// Number of documents directly inside a collection
    pub async fn count(&self, collection: &str) -> usize {
        self.docs
            .read()
            .await
            .keys()
            .filter(|p| p.collection() == collection)
            .count()
    }

    fn check_online(&self) -> ConsoleResult<()> {
        if self.faults.lock().offline {
            return Err(ConsoleError::StoreUnavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn check_injected_commit_failure(&self) -> ConsoleResult<()> {
        let mut faults = self.faults.lock();
        if let Some(target) = faults.fail_commit_at {
            faults.commits_since_armed += 1;
            if faults.commits_since_armed == target {
                faults.fail_commit_at = None;
                return Err(ConsoleError::StoreUnavailable(
                    "injected commit failure".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> ConsoleResult<Option<Document>> {
        self.check_online()?;
        let docs = self.docs.read().await;
        Ok(docs
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone())))
    }

    async fn query(&self, query: &Query) -> ConsoleResult<Vec<Document>> {
        self.check_online()?;
        let docs = self.docs.read().await;
        let scoped: Vec<Document> = docs
            .iter()
            .filter(|(path, _)| path.collection() == query.collection)
            .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
            .collect();
        Ok(query.apply(scoped))
    }

    async fn commit(&self, batch: WriteBatch) -> ConsoleResult<()> {
        self.check_online()?;
        batch.check_limit(self.max_batch_ops)?;
        if batch.is_empty() {
            return Ok(());
        }
        self.check_injected_commit_failure()?;

        let changed = {
            let mut docs = self.docs.write().await;

            let existing: BTreeMap<DocPath, Fields> = batch
                .paths()
                .into_iter()
                .filter_map(|p| docs.get(&p).cloned().map(|f| (p, f)))
                .collect();

            let staged = stage_writes(&batch, existing, Utc::now())?;

            for (path, fields) in staged.documents {
                match fields {
                    Some(fields) => {
                        docs.insert(path, fields);
                    }
                    None => {
                        docs.remove(&path);
                    }
                }
            }
            staged.changed_collections
        };

        self.faults.lock().commit_sizes.push(batch.len());
        self.hub.notify(changed);
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.hub.subscribe()
    }

    fn max_batch_ops(&self) -> usize {
        self.max_batch_ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Patch, WriteOp};
    use serde_json::json;

    #[tokio::test]
    async fn test_crud_round() {
        let store = MemoryStore::new();
        let path = DocPath::doc("users", "u1");

        store
            .set(&path, Patch::new().set("online", true).set("banned", false))
            .await
            .unwrap();
        store
            .update(&path, Patch::new().set("banned", true))
            .await
            .unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert!(doc.flag("online"));
        assert!(doc.flag("banned"));

        store.delete(&path).await.unwrap();
        assert!(store.get(&path).await.unwrap().is_none());
        // Deleting again is fine
        store.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(&DocPath::doc("users", "ghost"), Patch::new().set("banned", true))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::NotFound(_)));
        assert_eq!(store.count("users").await, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_is_atomic() {
        let store = MemoryStore::new();
        store
            .set(&DocPath::doc("rooms", "r1"), Patch::new().set("active", true))
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch
            .delete(DocPath::doc("rooms", "r1"))
            .update(DocPath::doc("rooms", "missing"), Patch::new().set("x", 1));
        assert!(store.commit(batch).await.is_err());

        assert!(store.get(&DocPath::doc("rooms", "r1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_limit_enforced() {
        let store = MemoryStore::with_max_batch_ops(2);
        let mut batch = WriteBatch::new();
        for i in 0..3 {
            batch.push(WriteOp::Set(
                DocPath::doc("messages", &i.to_string()),
                Patch::new().set("text", "hi"),
            ));
        }
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Validation(_)));
    }

    #[tokio::test]
    async fn test_offline_and_injected_failures() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.get(&DocPath::doc("users", "u1")).await.unwrap_err();
        assert!(err.is_store_failure());
        store.set_offline(false);

        store.fail_commit_at(2);
        store
            .add("admin_logs", Patch::new().set("action", "a"))
            .await
            .unwrap();
        assert!(store
            .add("admin_logs", Patch::new().set("action", "b"))
            .await
            .is_err());
        store
            .add("admin_logs", Patch::new().set("action", "c"))
            .await
            .unwrap();
        assert_eq!(store.count("admin_logs").await, 2);
        assert_eq!(store.commit_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_commit_notifies_changed_collection() {
        let store = MemoryStore::new();
        let mut changes = store.changes();
        store
            .upsert(
                &DocPath::doc("traffic", "2026010100"),
                Patch::new().increment("bytes", 1),
            )
            .await
            .unwrap();
        let event = changes.recv().await.unwrap();
        assert_eq!(event.collection, "traffic");

        let doc = store
            .get(&DocPath::doc("traffic", "2026010100"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.fields["bytes"], json!(1));
    }
}
