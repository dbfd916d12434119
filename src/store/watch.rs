/// Live query subscriptions
///
/// A subscription runs on its own task: it re-runs the query whenever the
/// watched collection changes and hands the full result set to the callback.
/// One task per subscription keeps deliveries totally ordered.
use crate::{
    error::ConsoleError,
    store::{Document, DocumentStore, Query},
};
use std::sync::Arc;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::debug;

/// Callback receiving every full snapshot
pub type SnapshotFn = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Callback receiving the error that ended a subscription
pub type ErrorFn = Arc<dyn Fn(ConsoleError) + Send + Sync>;

/// Handle to a live query; cancelling is idempotent and happens on drop
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether the subscription is still delivering snapshots
    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Start a live query
///
/// The change receiver is opened before the first read so no change between
/// the initial snapshot and the first notification is missed. A failed read
/// is passed to `on_error` and ends the subscription; there is no retry.
pub fn watch_query(
    store: Arc<dyn DocumentStore>,
    query: Query,
    on_snapshot: SnapshotFn,
    on_error: ErrorFn,
) -> Subscription {
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        let mut dirty = true;
        loop {
            if dirty {
                match store.query(&query).await {
                    Ok(docs) => on_snapshot(docs),
                    Err(e) => {
                        on_error(e);
                        return;
                    }
                }
            }

            dirty = match changes.recv().await {
                Ok(event) => event.collection == query.collection,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Subscription on {} lagged by {} events", query.collection, skipped);
                    true
                }
                Err(RecvError::Closed) => return,
            };
        }
    });

    Subscription { task: Some(task) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocPath, MemoryStore, Patch};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_snapshots_follow_changes() {
        let store = Arc::new(MemoryStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _sub = watch_query(
            store.clone(),
            Query::collection("users"),
            Arc::new(move |docs| {
                let _ = tx.send(docs.len());
            }),
            Arc::new(|_| {}),
        );

        assert_eq!(rx.recv().await, Some(0));

        store
            .set(&DocPath::doc("users", "u1"), Patch::new().set("online", true))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(1));

        // Changes in other collections do not trigger a delivery
        store
            .set(&DocPath::doc("rooms", "r1"), Patch::new().set("active", true))
            .await
            .unwrap();
        store
            .set(&DocPath::doc("users", "u2"), Patch::new().set("online", false))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_error_ends_subscription() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let sub = watch_query(
            store.clone(),
            Query::collection("users"),
            Arc::new(|_| {}),
            Arc::new(move |e| {
                let _ = tx.send(e.to_string());
            }),
        );

        let msg = rx.recv().await.unwrap();
        assert!(msg.contains("offline"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sub.is_active());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mut sub = watch_query(
            store,
            Query::collection("users"),
            Arc::new(|_| {}),
            Arc::new(|_| {}),
        );
        sub.cancel();
        sub.cancel();
        assert!(!sub.is_active());
    }
}
