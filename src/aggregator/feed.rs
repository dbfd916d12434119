/// Latest views kept for the presentation layer
use crate::aggregator::{AdminsView, LiveAggregator, LogsView, RoomsView, UsersView};
use parking_lot::RwLock;
use std::sync::Arc;

/// Holds the most recent view delivered by each live subscription
#[derive(Default)]
pub struct DashboardFeed {
    users: RwLock<UsersView>,
    rooms: RwLock<RoomsView>,
    admins: RwLock<AdminsView>,
    logs: RwLock<LogsView>,
}

impl DashboardFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the feed's subscriptions on `aggregator`
    pub fn attach(self: &Arc<Self>, aggregator: &LiveAggregator, log_limit: usize) {
        let feed = self.clone();
        aggregator.subscribe_users(move |view| *feed.users.write() = view);

        let feed = self.clone();
        aggregator.subscribe_rooms(move |view| *feed.rooms.write() = view);

        let feed = self.clone();
        aggregator.subscribe_admins(move |view| *feed.admins.write() = view);

        let feed = self.clone();
        aggregator.subscribe_logs(log_limit, move |view| *feed.logs.write() = view);
    }

    pub fn users(&self) -> UsersView {
        self.users.read().clone()
    }

    pub fn rooms(&self) -> RoomsView {
        self.rooms.read().clone()
    }

    pub fn admins(&self) -> AdminsView {
        self.admins.read().clone()
    }

    pub fn logs(&self) -> LogsView {
        self.logs.read().clone()
    }
}
