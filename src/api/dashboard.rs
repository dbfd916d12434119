/// Read-only dashboard endpoints backed by the live feed
use crate::{
    aggregator::{AdminsView, DashboardStats, LogsView, RoomsView},
    auth::AdminAuthContext,
    error::ConsoleResult,
    traffic::{format_bytes, TrafficSummary},
    AppContext,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Build dashboard routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/session", post(open_session))
        .route("/api/stats", get(get_stats))
        .route("/api/users", get(get_users))
        .route("/api/rooms", get(get_rooms))
        .route("/api/admins", get(get_admins))
        .route("/api/logs", get(get_logs))
        .route("/api/traffic", get(get_traffic))
}

/// Record a dashboard visit and describe the caller
async fn open_session(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
) -> ConsoleResult<Json<Value>> {
    ctx.moderation.record_dashboard_access(&auth.caller).await?;

    let admin = auth.caller.admin();
    Ok(Json(json!({
        "success": true,
        "message": "Dashboard access recorded",
        "admin": {
            "id": auth.caller.id(),
            "email": auth.principal().email,
            "superAdmin": admin.super_admin,
        }
    })))
}

async fn get_stats(State(ctx): State<AppContext>, _auth: AdminAuthContext) -> Json<DashboardStats> {
    Json(ctx.aggregator.stats())
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    #[serde(default)]
    search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsersResponse {
    rows: Vec<crate::aggregator::UserRow>,
    total_users: usize,
    online_users: usize,
    banned_users: usize,
    effectively_banned_users: usize,
    activity: [usize; crate::aggregator::views::ACTIVITY_SLOTS],
    degraded: bool,
}

/// Users table, optionally narrowed by a free-text search
async fn get_users(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<UsersQuery>,
) -> Json<UsersResponse> {
    let view = ctx.feed.users();
    let rows = match query.search.as_deref() {
        Some(term) => view.search(term).into_iter().cloned().collect(),
        None => view.rows.clone(),
    };

    Json(UsersResponse {
        rows,
        total_users: view.total_users,
        online_users: view.online_users,
        banned_users: view.banned_users,
        effectively_banned_users: view.effectively_banned_users,
        activity: view.activity,
        degraded: view.degraded,
    })
}

async fn get_rooms(State(ctx): State<AppContext>, _auth: AdminAuthContext) -> Json<RoomsView> {
    Json(ctx.feed.rooms())
}

async fn get_admins(State(ctx): State<AppContext>, _auth: AdminAuthContext) -> Json<AdminsView> {
    Json(ctx.feed.admins())
}

async fn get_logs(State(ctx): State<AppContext>, _auth: AdminAuthContext) -> Json<LogsView> {
    Json(ctx.feed.logs())
}

#[derive(Debug, Serialize)]
struct TrafficResponse {
    #[serde(flatten)]
    summary: TrafficSummary,
    formatted: Value,
}

/// Traffic totals with human-readable sizes
async fn get_traffic(State(ctx): State<AppContext>, _auth: AdminAuthContext) -> Json<TrafficResponse> {
    let summary = ctx.traffic.summary();
    let formatted = json!({
        "today": format_bytes(summary.today),
        "week": format_bytes(summary.week),
        "month": format_bytes(summary.month),
    });
    Json(TrafficResponse { summary, formatted })
}
