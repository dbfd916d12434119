/// Live Aggregator
///
/// Subscribes to users, rooms, admins and audit logs and turns every full
/// snapshot into derived views and counters. A failing subscription
/// delivers a degraded empty view; recovery is a fresh subscribe.

pub mod feed;
pub mod subscriptions;
pub mod views;

pub use feed::DashboardFeed;
pub use subscriptions::SubscriptionManager;
pub use views::{
    AdminsView, DashboardStats, LogsView, RoomSizeDistribution, RoomsView, UserRow, UsersView,
};

use crate::{
    audit,
    error::ConsoleError,
    metrics,
    models::collections,
    store::{Document, DocumentStore, Query},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Subscription selectors
pub mod selectors {
    pub const USERS: &str = "users";
    pub const ROOMS: &str = "rooms";
    pub const ADMINS: &str = "admins";
    pub const LOGS: &str = "logs";
}

/// Live aggregator over the document store
pub struct LiveAggregator {
    subscriptions: SubscriptionManager,
    stats: watch::Sender<DashboardStats>,
}

impl LiveAggregator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (stats, _) = watch::channel(DashboardStats::default());
        Self {
            subscriptions: SubscriptionManager::new(store),
            stats,
        }
    }

    /// Watch all users; counters feed the dashboard stats
    pub fn subscribe_users<F>(&self, callback: F)
    where
        F: Fn(UsersView) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let stats = self.stats.clone();
        let failed_stats = self.stats.clone();

        let on_change = {
            let callback = callback.clone();
            Arc::new(move |docs: Vec<Document>| {
                let now = Utc::now();
                let view = UsersView::from_snapshot(&docs, now);
                stats.send_modify(|s| {
                    s.total_users = view.total_users;
                    s.online_users = view.online_users;
                    s.banned_users = view.banned_users;
                    s.effectively_banned_users = view.effectively_banned_users;
                    s.users_degraded = false;
                    s.updated_at = Some(now);
                });
                metrics::ONLINE_USERS.set(view.online_users as i64);
                callback(view);
            })
        };

        self.subscriptions.subscribe(
            selectors::USERS,
            Query::collection(collections::USERS),
            on_change,
            degrade(selectors::USERS, move || {
                failed_stats.send_modify(|s| {
                    s.total_users = 0;
                    s.online_users = 0;
                    s.banned_users = 0;
                    s.effectively_banned_users = 0;
                    s.users_degraded = true;
                    s.updated_at = Some(Utc::now());
                });
                metrics::ONLINE_USERS.set(0);
                callback(UsersView::degraded());
            }),
        );
    }

    /// Watch rooms flagged active
    pub fn subscribe_rooms<F>(&self, callback: F)
    where
        F: Fn(RoomsView) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let stats = self.stats.clone();
        let failed_stats = self.stats.clone();

        let on_change = {
            let callback = callback.clone();
            Arc::new(move |docs: Vec<Document>| {
                let view = RoomsView::from_snapshot(&docs);
                stats.send_modify(|s| {
                    s.active_rooms = view.active_rooms;
                    s.rooms_degraded = false;
                    s.updated_at = Some(Utc::now());
                });
                metrics::ACTIVE_ROOMS.set(view.active_rooms as i64);
                callback(view);
            })
        };

        self.subscriptions.subscribe(
            selectors::ROOMS,
            Query::collection(collections::ROOMS).where_eq("active", true),
            on_change,
            degrade(selectors::ROOMS, move || {
                failed_stats.send_modify(|s| {
                    s.active_rooms = 0;
                    s.rooms_degraded = true;
                    s.updated_at = Some(Utc::now());
                });
                metrics::ACTIVE_ROOMS.set(0);
                callback(RoomsView::degraded());
            }),
        );
    }

    pub fn subscribe_admins<F>(&self, callback: F)
    where
        F: Fn(AdminsView) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let on_change = {
            let callback = callback.clone();
            Arc::new(move |docs: Vec<Document>| callback(AdminsView::from_snapshot(&docs)))
        };

        self.subscriptions.subscribe(
            selectors::ADMINS,
            Query::collection(collections::ADMINS),
            on_change,
            degrade(selectors::ADMINS, move || callback(AdminsView::degraded())),
        );
    }

    /// Watch the newest `limit` audit entries
    pub fn subscribe_logs<F>(&self, limit: usize, callback: F)
    where
        F: Fn(LogsView) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let on_change = {
            let callback = callback.clone();
            Arc::new(move |docs: Vec<Document>| callback(LogsView::from_snapshot(&docs)))
        };

        self.subscriptions.subscribe(
            selectors::LOGS,
            audit::log_query(limit),
            on_change,
            degrade(selectors::LOGS, move || callback(LogsView::degraded())),
        );
    }

    /// Latest dashboard counters
    pub fn stats(&self) -> DashboardStats {
        self.stats.borrow().clone()
    }

    /// Receiver notified whenever the counters change
    pub fn watch_stats(&self) -> watch::Receiver<DashboardStats> {
        self.stats.subscribe()
    }

    pub fn unsubscribe(&self, selector: &str) -> bool {
        self.subscriptions.unsubscribe(selector)
    }

    pub fn dispose_all(&self) {
        self.subscriptions.dispose_all();
    }

    /// Selectors with a live subscription
    pub fn active(&self) -> Vec<String> {
        self.subscriptions.active()
    }
}

/// Error handler that logs, counts and delivers a degraded view
fn degrade<F>(selector: &'static str, deliver: F) -> Arc<dyn Fn(ConsoleError) + Send + Sync>
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(move |e: ConsoleError| {
        warn!("Live subscription {} failed: {}", selector, e);
        metrics::record_subscription_error(selector);
        deliver();
    })
}
