/// Moderation endpoints: bans, room deletion and admin management
use crate::{
    auth::AdminAuthContext,
    error::{ConsoleError, ConsoleResult},
    AppContext,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

/// Build moderation routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        // User bans
        .route("/api/users/:id/ban", post(ban_user))
        .route("/api/users/:id/temp-ban", post(temp_ban_user))
        .route("/api/users/:id/unban", post(unban_user))
        // Rooms
        .route("/api/rooms/:id", delete(delete_room))
        // Admin management
        .route("/api/admins", post(add_admin))
        .route("/api/admins/:id", delete(remove_admin))
}

/// Ban a user permanently
async fn ban_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(user_id): Path<String>,
) -> ConsoleResult<Json<Value>> {
    ctx.moderation.ban(&auth.caller, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("User {} banned permanently", user_id),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TempBanRequest {
    duration_seconds: Option<i64>,
}

/// Ban a user temporarily; the configured duration applies when none is given
async fn temp_ban_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(user_id): Path<String>,
    body: Option<Json<TempBanRequest>>,
) -> ConsoleResult<Json<Value>> {
    let duration = ban_duration(
        body.and_then(|Json(req)| req.duration_seconds),
        ctx.moderation.options().temp_ban_duration,
    )?;

    let expires = ctx
        .moderation
        .temp_ban(&auth.caller, &user_id, duration)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("User {} banned until {}", user_id, expires.to_rfc3339()),
        "expires": expires,
    })))
}

/// Requested ban length, or `default` when the body names none
fn ban_duration(seconds: Option<i64>, default: Duration) -> ConsoleResult<Duration> {
    match seconds {
        Some(secs) => Duration::try_seconds(secs).ok_or_else(|| {
            ConsoleError::Validation(format!("Ban duration of {} seconds is out of range", secs))
        }),
        None => Ok(default),
    }
}

/// Lift a ban
async fn unban_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(user_id): Path<String>,
) -> ConsoleResult<Json<Value>> {
    ctx.moderation.unban(&auth.caller, &user_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("User {} unbanned", user_id),
    })))
}

/// Delete a room and everything in it
async fn delete_room(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(room_id): Path<String>,
) -> ConsoleResult<Json<Value>> {
    let report = ctx.moderation.delete_room(&auth.caller, &room_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Room {} deleted", room_id),
        "report": report,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddAdminRequest {
    email: String,
    #[serde(default)]
    super_admin: bool,
}

/// Grant admin capability by email
async fn add_admin(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<AddAdminRequest>,
) -> ConsoleResult<(StatusCode, Json<Value>)> {
    let admin = ctx
        .moderation
        .add_admin(&auth.caller, &req.email, req.super_admin)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("{} is now an administrator", req.email.trim()),
            "admin": admin,
        })),
    ))
}

/// Revoke admin capability
async fn remove_admin(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(admin_id): Path<String>,
) -> ConsoleResult<Json<Value>> {
    ctx.moderation.remove_admin(&auth.caller, &admin_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Administrator {} removed", admin_id),
    })))
}
