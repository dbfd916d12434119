/// API routes and handlers
pub mod dashboard;
pub mod moderation;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(dashboard::routes())
        .merge(moderation::routes())
}
