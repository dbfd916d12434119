/// Document Store client
///
/// Abstraction over a document database exposing CRUD, live change
/// notifications and size-limited batched writes. Documents live at
/// slash-separated paths (`rooms/{id}/messages/{mid}`) and hold a flat map
/// of JSON fields.
///
/// Two backends are provided: an in-process [`MemoryStore`] and a
/// SQLite-backed [`SqliteStore`].

pub mod batch;
pub mod memory;
pub mod patch;
pub mod query;
pub mod sqlite;
pub mod watch;

pub use batch::{WriteBatch, WriteOp};
pub use memory::MemoryStore;
pub use patch::{timestamp_value, FieldTransform, Patch};
pub use query::{Direction, Predicate, Query};
pub use sqlite::SqliteStore;
pub use watch::{watch_query, Subscription};

use crate::error::{ConsoleError, ConsoleResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::broadcast;

/// Field map of a single document
pub type Fields = serde_json::Map<String, Value>;

/// Capacity of the change notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Path of a single document: `collection/id`, possibly nested
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(String);

impl DocPath {
    /// Parse a document path; it must have an even, non-zero number of segments
    pub fn parse(path: &str) -> ConsoleResult<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 2 || segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return Err(ConsoleError::Validation(format!(
                "Invalid document path: {}",
                path
            )));
        }
        Ok(Self(path.to_string()))
    }

    /// Path of document `id` inside `collection`
    pub fn doc(collection: &str, id: &str) -> Self {
        Self(format!("{}/{}", collection, id))
    }

    /// Collection path containing this document
    pub fn collection(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// Document id (last path segment)
    pub fn id(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Path of a nested sub-collection under this document
    pub fn sub_collection(&self, name: &str) -> String {
        format!("{}/{}", self.0, name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: DocPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Boolean field, absent or non-boolean reads as false
    pub fn flag(&self, field: &str) -> bool {
        self.fields
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Decode the field map into a typed model
    pub fn decode<T: DeserializeOwned>(&self) -> ConsoleResult<T> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}

/// Notification that documents in a collection changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: String,
}

/// Fan-out of change notifications shared by the backends
#[derive(Clone)]
pub struct ChangeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Announce changed collections; having no listeners is not an error
    pub fn notify(&self, collections: BTreeSet<String>) {
        for collection in collections {
            let _ = self.sender.send(ChangeEvent { collection });
        }
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Document store backend trait
///
/// Implementations only provide reads, atomic batch commits and change
/// notifications; single-document writes are one-operation batches.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a single document
    async fn get(&self, path: &DocPath) -> ConsoleResult<Option<Document>>;

    /// Run a query against one collection
    async fn query(&self, query: &Query) -> ConsoleResult<Vec<Document>>;

    /// Atomically apply every operation in the batch, or none of them
    async fn commit(&self, batch: WriteBatch) -> ConsoleResult<()>;

    /// Receiver of collection-level change notifications
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;

    /// Maximum number of operations accepted in one batch
    fn max_batch_ops(&self) -> usize;

    /// Replace a document
    async fn set(&self, path: &DocPath, patch: Patch) -> ConsoleResult<()> {
        self.commit(WriteBatch::single(WriteOp::Set(path.clone(), patch)))
            .await
    }

    /// Create a document; fails with `Conflict` if it already exists
    async fn create(&self, path: &DocPath, patch: Patch) -> ConsoleResult<()> {
        self.commit(WriteBatch::single(WriteOp::Create(path.clone(), patch)))
            .await
    }

    /// Merge into a document, creating it if absent
    async fn upsert(&self, path: &DocPath, patch: Patch) -> ConsoleResult<()> {
        self.commit(WriteBatch::single(WriteOp::Upsert(path.clone(), patch)))
            .await
    }

    /// Merge into an existing document; fails with `NotFound` if absent
    async fn update(&self, path: &DocPath, patch: Patch) -> ConsoleResult<()> {
        self.commit(WriteBatch::single(WriteOp::Update(path.clone(), patch)))
            .await
    }

    /// Delete a document; deleting a missing document succeeds
    async fn delete(&self, path: &DocPath) -> ConsoleResult<()> {
        self.commit(WriteBatch::single(WriteOp::Delete(path.clone())))
            .await
    }

    /// Add a document with a generated id
    async fn add(&self, collection: &str, patch: Patch) -> ConsoleResult<DocPath> {
        let path = DocPath::doc(collection, &uuid::Uuid::new_v4().simple().to_string());
        self.create(&path, patch).await?;
        Ok(path)
    }
}
