/// Cascading room deletion
///
/// A room owns four dependent sub-collections. The store has no recursive
/// delete and caps batch sizes, so each sub-collection is drained in bounded
/// batches before the room document itself goes.
use crate::{
    error::{ConsoleError, ConsoleResult},
    metrics,
    models::collections,
    store::{DocPath, DocumentStore, Query, WriteBatch},
};
use serde::Serialize;
use tracing::{debug, warn};

/// Default number of documents fetched and deleted per batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Work done on one sub-collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub batches: usize,
    pub documents: usize,
}

/// Outcome of a completed cascade
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub room_id: String,
    pub collections: Vec<CollectionReport>,
}

impl CascadeReport {
    pub fn total_documents(&self) -> usize {
        self.collections.iter().map(|c| c.documents).sum()
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == name)
    }
}

/// Delete a room and all of its dependents
///
/// Sub-collections are drained in a fixed order; the room document is
/// deleted last. When a batch fails the documents already removed stay
/// removed and the room stays in place, so calling this again resumes the
/// work.
pub async fn delete_room_cascade(
    store: &dyn DocumentStore,
    room: &DocPath,
    batch_size: usize,
) -> ConsoleResult<CascadeReport> {
    let batch_size = batch_size.clamp(1, store.max_batch_ops().max(1));
    let mut report = CascadeReport {
        room_id: room.id().to_string(),
        collections: Vec::with_capacity(collections::ROOM_DEPENDENTS.len()),
    };
    let mut deleted = 0;

    for name in collections::ROOM_DEPENDENTS {
        let collection = room.sub_collection(name);
        let mut entry = CollectionReport {
            collection: name.to_string(),
            ..CollectionReport::default()
        };

        loop {
            let docs = store
                .query(&Query::collection(collection.as_str()).limit(batch_size))
                .await
                .map_err(|e| interrupted(name, deleted, e))?;

            let fetched = docs.len();
            if fetched == 0 {
                break;
            }

            let mut batch = WriteBatch::new();
            for doc in docs {
                batch.delete(doc.path);
            }
            store
                .commit(batch)
                .await
                .map_err(|e| interrupted(name, deleted, e))?;

            entry.batches += 1;
            entry.documents += fetched;
            deleted += fetched;
            metrics::record_cascade_deleted(name, fetched);

            // A short batch means the collection is drained
            if fetched < batch_size {
                break;
            }
        }

        debug!(
            "Drained {} from room {}: {} documents in {} batches",
            name,
            room.id(),
            entry.documents,
            entry.batches
        );
        report.collections.push(entry);
    }

    store
        .delete(room)
        .await
        .map_err(|e| interrupted(collections::ROOMS, deleted, e))?;

    Ok(report)
}

fn interrupted(collection: &str, deleted: usize, error: ConsoleError) -> ConsoleError {
    warn!(
        "Room deletion interrupted in {} after {} documents: {}",
        collection, deleted, error
    );
    ConsoleError::PartialCascade {
        collection: collection.to_string(),
        deleted,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Patch};

    async fn seed_room(store: &MemoryStore, room: &DocPath, sizes: [usize; 4]) {
        store
            .set(room, Patch::new().set("code", "ROOM1").set("active", true))
            .await
            .unwrap();
        for (name, count) in collections::ROOM_DEPENDENTS.iter().zip(sizes) {
            for i in 0..count {
                store
                    .set(
                        &DocPath::doc(&room.sub_collection(name), &format!("d{}", i)),
                        Patch::new().set("n", i as i64),
                    )
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_empty_room_is_deleted() {
        let store = MemoryStore::new();
        let room = DocPath::doc("rooms", "r1");
        seed_room(&store, &room, [0, 0, 0, 0]).await;

        let report = delete_room_cascade(&store, &room, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();
        assert_eq!(report.total_documents(), 0);
        assert_eq!(report.collections.len(), 4);
        assert!(store.get(&room).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_trailing_empty_fetch() {
        let store = MemoryStore::new();
        let room = DocPath::doc("rooms", "r1");
        seed_room(&store, &room, [10, 0, 3, 0]).await;

        let report = delete_room_cascade(&store, &room, 5).await.unwrap();
        // 10 participants at batch size 5: two full batches, then an empty fetch
        assert_eq!(report.collection("participants").unwrap().batches, 2);
        assert_eq!(report.collection("signaling").unwrap().batches, 1);
        assert_eq!(report.total_documents(), 13);
        assert_eq!(store.count("rooms/r1/participants").await, 0);
    }

    #[tokio::test]
    async fn test_batch_size_capped_by_store_limit() {
        let store = MemoryStore::with_max_batch_ops(4);
        let room = DocPath::doc("rooms", "r1");
        seed_room(&store, &room, [9, 0, 0, 0]).await;

        let report = delete_room_cascade(&store, &room, 50).await.unwrap();
        assert_eq!(report.collection("participants").unwrap().batches, 3);
        assert!(store.get(&room).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_room_and_reports_progress() {
        let store = MemoryStore::new();
        let room = DocPath::doc("rooms", "r1");
        seed_room(&store, &room, [4, 4, 0, 0]).await;

        // Second commit is the messages batch
        store.fail_commit_at(2);
        let err = delete_room_cascade(&store, &room, 50).await.unwrap_err();
        match err {
            ConsoleError::PartialCascade {
                collection,
                deleted,
                ..
            } => {
                assert_eq!(collection, "messages");
                assert_eq!(deleted, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.get(&room).await.unwrap().is_some());
        assert_eq!(store.count("rooms/r1/participants").await, 0);
        assert_eq!(store.count("rooms/r1/messages").await, 4);

        let report = delete_room_cascade(&store, &room, 50).await.unwrap();
        assert_eq!(report.total_documents(), 4);
        assert!(store.get(&room).await.unwrap().is_none());
    }
}
