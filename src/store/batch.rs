/// Batched writes and their staging against current document state
use crate::{
    error::{ConsoleError, ConsoleResult},
    store::{DocPath, Fields, Patch},
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// A single write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the document
    Set(DocPath, Patch),
    /// Create the document; `Conflict` if it exists
    Create(DocPath, Patch),
    /// Merge into the document, creating it if absent
    Upsert(DocPath, Patch),
    /// Merge into an existing document; `NotFound` if absent
    Update(DocPath, Patch),
    /// Delete the document if present
    Delete(DocPath),
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set(p, _)
            | WriteOp::Create(p, _)
            | WriteOp::Upsert(p, _)
            | WriteOp::Update(p, _)
            | WriteOp::Delete(p) => p,
        }
    }
}

/// Ordered group of writes committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(op: WriteOp) -> Self {
        Self { ops: vec![op] }
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn update(&mut self, path: DocPath, patch: Patch) -> &mut Self {
        self.push(WriteOp::Update(path, patch))
    }

    pub fn delete(&mut self, path: DocPath) -> &mut Self {
        self.push(WriteOp::Delete(path))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Distinct paths touched by the batch
    pub fn paths(&self) -> BTreeSet<DocPath> {
        self.ops.iter().map(|op| op.path().clone()).collect()
    }

    /// Reject batches above the backend's operation limit
    pub fn check_limit(&self, max_ops: usize) -> ConsoleResult<()> {
        if self.ops.len() > max_ops {
            return Err(ConsoleError::Validation(format!(
                "Batch of {} operations exceeds limit of {}",
                self.ops.len(),
                max_ops
            )));
        }
        Ok(())
    }
}

/// Outcome of staging a batch: final state per touched path
#[derive(Debug, Default)]
pub struct StagedWrites {
    /// `None` means the document is deleted
    pub documents: BTreeMap<DocPath, Option<Fields>>,
    pub changed_collections: BTreeSet<String>,
}

/// Evaluate a batch against the current state of the touched documents
///
/// `existing` holds the current fields of every touched document that
/// exists. Operations on the same path see the effect of earlier ones.
/// Fails without side effects if any precondition does not hold.
pub fn stage_writes(
    batch: &WriteBatch,
    existing: BTreeMap<DocPath, Fields>,
    now: DateTime<Utc>,
) -> ConsoleResult<StagedWrites> {
    let mut state: BTreeMap<DocPath, Option<Fields>> =
        existing.into_iter().map(|(p, f)| (p, Some(f))).collect();
    let mut staged = StagedWrites::default();

    for op in batch.ops() {
        let path = op.path().clone();
        let current = state.get(&path).cloned().flatten();

        let next = match op {
            WriteOp::Set(_, patch) => {
                let mut fields = Fields::new();
                patch.apply(&mut fields, now);
                Some(fields)
            }
            WriteOp::Create(_, patch) => {
                if current.is_some() {
                    return Err(ConsoleError::Conflict(format!(
                        "Document {} already exists",
                        path
                    )));
                }
                let mut fields = Fields::new();
                patch.apply(&mut fields, now);
                Some(fields)
            }
            WriteOp::Upsert(_, patch) => {
                let mut fields = current.unwrap_or_default();
                patch.apply(&mut fields, now);
                Some(fields)
            }
            WriteOp::Update(_, patch) => {
                let mut fields = current
                    .ok_or_else(|| ConsoleError::NotFound(format!("Document {}", path)))?;
                patch.apply(&mut fields, now);
                Some(fields)
            }
            WriteOp::Delete(_) => None,
        };

        staged
            .changed_collections
            .insert(path.collection().to_string());
        state.insert(path, next);
    }

    let touched = batch.paths();
    staged.documents = state
        .into_iter()
        .filter(|(path, _)| touched.contains(path))
        .collect();

    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Fields::new(),
        }
    }

    #[test]
    fn test_update_missing_document_fails_whole_batch() {
        let mut batch = WriteBatch::new();
        batch
            .update(DocPath::doc("rooms", "r1"), Patch::new().set("active", false))
            .update(DocPath::doc("rooms", "r2"), Patch::new().set("active", false));

        let mut existing = BTreeMap::new();
        existing.insert(DocPath::doc("rooms", "r1"), fields(json!({"active": true})));

        let err = stage_writes(&batch, existing, Utc::now()).unwrap_err();
        assert!(matches!(err, ConsoleError::NotFound(_)));
    }

    #[test]
    fn test_create_conflict() {
        let batch = WriteBatch::single(WriteOp::Create(
            DocPath::doc("admins", "u1"),
            Patch::new().set("email", "a@example.com"),
        ));
        let mut existing = BTreeMap::new();
        existing.insert(DocPath::doc("admins", "u1"), Fields::new());

        let err = stage_writes(&batch, existing, Utc::now()).unwrap_err();
        assert!(matches!(err, ConsoleError::Conflict(_)));
    }

    #[test]
    fn test_sequential_ops_on_same_path() {
        let path = DocPath::doc("traffic", "2026010112");
        let mut batch = WriteBatch::new();
        batch
            .push(WriteOp::Upsert(path.clone(), Patch::new().increment("bytes", 5)))
            .push(WriteOp::Upsert(path.clone(), Patch::new().increment("bytes", 7)));

        let staged = stage_writes(&batch, BTreeMap::new(), Utc::now()).unwrap();
        let doc = staged.documents[&path].as_ref().unwrap();
        assert_eq!(doc["bytes"], json!(12));
        assert!(staged.changed_collections.contains("traffic"));
    }

    #[test]
    fn test_delete_stages_none() {
        let path = DocPath::doc("rooms/r1/messages", "m1");
        let mut batch = WriteBatch::new();
        batch.delete(path.clone());

        let staged = stage_writes(&batch, BTreeMap::new(), Utc::now()).unwrap();
        assert_eq!(staged.documents.get(&path), Some(&None));
        assert!(batch.check_limit(1).is_ok());
        assert!(batch.check_limit(0).is_err());
    }
}
