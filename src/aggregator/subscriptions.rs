/// Registry of live subscriptions keyed by selector
use crate::store::{
    watch::{ErrorFn, SnapshotFn},
    watch_query, DocumentStore, Query, Subscription,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

/// Owns every live subscription of an aggregator
///
/// At most one subscription exists per selector; subscribing again replaces
/// (and cancels) the previous one.
pub struct SubscriptionManager {
    store: Arc<dyn DocumentStore>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Start delivering full snapshots of `query` under `selector`
    pub fn subscribe(
        &self,
        selector: &str,
        query: Query,
        on_change: SnapshotFn,
        on_error: ErrorFn,
    ) {
        let mut subscriptions = self.subscriptions.lock();
        if let Some(mut previous) = subscriptions.remove(selector) {
            debug!("Replacing subscription {}", selector);
            previous.cancel();
        }

        let subscription = watch_query(self.store.clone(), query, on_change, on_error);
        subscriptions.insert(selector.to_string(), subscription);
    }

    /// Cancel the subscription under `selector`; returns whether one existed
    pub fn unsubscribe(&self, selector: &str) -> bool {
        match self.subscriptions.lock().remove(selector) {
            Some(mut subscription) => {
                subscription.cancel();
                true
            }
            None => false,
        }
    }

    /// Tear down every subscription
    pub fn dispose_all(&self) {
        let drained: Vec<_> = self.subscriptions.lock().drain().collect();
        let count = drained.len();
        for (_, mut subscription) in drained {
            subscription.cancel();
        }
        debug!("Disposed {} subscriptions", count);
    }

    /// Selectors whose subscription is still delivering, sorted
    pub fn active(&self) -> Vec<String> {
        let mut selectors: Vec<String> = self
            .subscriptions
            .lock()
            .iter()
            .filter(|(_, subscription)| subscription.is_active())
            .map(|(selector, _)| selector.clone())
            .collect();
        selectors.sort();
        selectors
    }

    /// Registered selectors, whether or not still delivering
    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
