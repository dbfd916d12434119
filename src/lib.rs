/// Roomwatch - operator console engine for a real-time rooms platform
///
/// Aggregates live views of users, rooms, admins and the audit log from a
/// document store, and applies audited moderation actions (bans, kicks,
/// cascading room deletion, admin management) on behalf of admins.

pub mod aggregator;
pub mod api;
pub mod attribution;
pub mod audit;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod metrics;
pub mod models;
pub mod moderation;
pub mod server;
pub mod store;
pub mod traffic;

pub use context::AppContext;
pub use error::{ConsoleError, ConsoleResult};
