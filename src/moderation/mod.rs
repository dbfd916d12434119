/// Moderation Engine
///
/// Sole writer of user ban state, sole deleter of room aggregates and the
/// only path for granting or revoking admin capability. Every successful
/// mutation is followed by exactly one audit entry; failed mutations are not
/// audited.

pub mod cascade;
pub mod policy;

pub use cascade::{CascadeReport, CollectionReport, DEFAULT_BATCH_SIZE};
pub use policy::{authorize, Caller, PolicyAction};

use crate::{
    audit::{AuditAction, AuditLogger},
    error::{ConsoleError, ConsoleResult},
    identity::{IdentityProvider, Principal},
    metrics,
    models::{collections, Admin},
    store::{timestamp_value, DocPath, DocumentStore, Patch, Query, WriteBatch, WriteOp},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

/// Tunables for moderation actions
#[derive(Debug, Clone)]
pub struct ModerationOptions {
    /// Duration applied by a temporary ban when none is given
    pub temp_ban_duration: Duration,
    /// Documents per batch when draining room sub-collections
    pub cascade_batch_size: usize,
}

impl Default for ModerationOptions {
    fn default() -> Self {
        Self {
            temp_ban_duration: Duration::hours(1),
            cascade_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Room removed by a cascade, with the fields kept for auditing
struct RemovedRoom {
    report: CascadeReport,
    code: Option<String>,
    host: Option<String>,
}

/// Moderation engine
#[derive(Clone)]
pub struct ModerationEngine {
    store: Arc<dyn DocumentStore>,
    audit: AuditLogger,
    options: ModerationOptions,
}

impl ModerationEngine {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditLogger, options: ModerationOptions) -> Self {
        Self {
            store,
            audit,
            options,
        }
    }

    pub fn options(&self) -> &ModerationOptions {
        &self.options
    }

    /// Look up the admin record of an authenticated principal
    pub async fn resolve_caller(&self, principal: &Principal) -> ConsoleResult<Caller> {
        let path = DocPath::doc(collections::ADMINS, &principal.id);
        match self.store.get(&path).await? {
            Some(doc) => Ok(Caller::new(principal.clone(), Admin::from_document(&doc)?)),
            None => Err(ConsoleError::Unauthorized(format!(
                "{} is not an administrator",
                principal.id
            ))),
        }
    }

    /// Resolve whoever the identity provider reports as signed in
    pub async fn current_caller(&self, identity: &dyn IdentityProvider) -> ConsoleResult<Caller> {
        let principal = identity
            .current_principal()
            .ok_or_else(|| ConsoleError::Authentication("No signed-in principal".to_string()))?;
        self.resolve_caller(&principal).await
    }

    /// Ban a user permanently and disconnect them
    pub async fn ban(&self, caller: &Caller, user_id: &str) -> ConsoleResult<()> {
        let result = self.apply_ban(caller, user_id, None).await;
        self.conclude(caller, AuditAction::BanPermanent, Some(user_id), result)
            .await
    }

    /// Ban a user for `duration` and disconnect them
    pub async fn temp_ban(
        &self,
        caller: &Caller,
        user_id: &str,
        duration: Duration,
    ) -> ConsoleResult<DateTime<Utc>> {
        if duration <= Duration::zero() {
            return Err(ConsoleError::Validation(
                "Ban duration must be positive".to_string(),
            ));
        }

        let expires = Utc::now().checked_add_signed(duration).ok_or_else(|| {
            ConsoleError::Validation("Ban duration is out of range".to_string())
        })?;
        let result = self
            .apply_ban(caller, user_id, Some(expires))
            .await
            .map(|_| expires);
        self.conclude(
            caller,
            AuditAction::BanTemporary { expires },
            Some(user_id),
            result,
        )
        .await
    }

    /// Temporary ban with the configured default duration
    pub async fn temp_ban_default(
        &self,
        caller: &Caller,
        user_id: &str,
    ) -> ConsoleResult<DateTime<Utc>> {
        self.temp_ban(caller, user_id, self.options.temp_ban_duration)
            .await
    }

    /// Lift any ban; does not reconnect the user anywhere
    pub async fn unban(&self, caller: &Caller, user_id: &str) -> ConsoleResult<()> {
        let result = self.clear_ban(caller, user_id).await;
        self.conclude(caller, AuditAction::Unban, Some(user_id), result)
            .await
    }

    /// Delete a room together with its dependent sub-collections
    pub async fn delete_room(&self, caller: &Caller, room_id: &str) -> ConsoleResult<CascadeReport> {
        let result = self.remove_room(caller, room_id).await;
        let action = match &result {
            Ok(removed) => AuditAction::DeleteRoom {
                code: removed.code.clone(),
                host: removed.host.clone(),
            },
            Err(_) => AuditAction::DeleteRoom {
                code: None,
                host: None,
            },
        };

        let removed = self.conclude(caller, action, Some(room_id), result).await?;
        info!(
            "Deleted room {} with {} dependent documents",
            room_id,
            removed.report.total_documents()
        );
        Ok(removed.report)
    }

    /// Grant admin capability to the user registered under `email`
    pub async fn add_admin(
        &self,
        caller: &Caller,
        email: &str,
        super_admin: bool,
    ) -> ConsoleResult<Admin> {
        let email = email.trim();
        let result = self.grant_admin(caller, email, super_admin).await;
        let target = result.as_ref().ok().map(|admin| admin.id.clone());
        let action = AuditAction::AddAdmin {
            email: email.to_string(),
            super_admin,
        };
        self.conclude(caller, action, target.as_deref(), result).await
    }

    /// Revoke admin capability; the user record is left untouched
    pub async fn remove_admin(&self, caller: &Caller, admin_id: &str) -> ConsoleResult<()> {
        let result = self.revoke_admin(caller, admin_id).await;
        let email = result.as_ref().ok().cloned().flatten();
        self.conclude(
            caller,
            AuditAction::RemoveAdmin { email },
            Some(admin_id),
            result,
        )
        .await
        .map(|_| ())
    }

    /// Record that an operator opened the console
    pub async fn record_dashboard_access(&self, caller: &Caller) -> ConsoleResult<()> {
        let result = authorize(caller, PolicyAction::Moderate);
        self.conclude(caller, AuditAction::DashboardAccess, None, result)
            .await
    }

    /// Disconnect a user from every room listing them as a participant
    ///
    /// Returns the number of rooms the user was removed from.
    pub(crate) async fn kick(&self, user_id: &str) -> ConsoleResult<usize> {
        let rooms = self
            .store
            .query(
                &Query::collection(collections::ROOMS)
                    .where_array_contains("participants", user_id),
            )
            .await?;

        let mut ops = Vec::with_capacity(rooms.len() * 2);
        for room in &rooms {
            ops.push(WriteOp::Update(
                room.path.clone(),
                Patch::new().array_remove("participants", user_id),
            ));

            // Presence records may be missing; updating one would fail the batch
            let presence = DocPath::doc(&room.path.sub_collection(collections::PARTICIPANTS), user_id);
            if self.store.get(&presence).await?.is_some() {
                ops.push(WriteOp::Update(presence, Patch::new().set("online", false)));
            }
        }

        let limit = self.store.max_batch_ops().max(1);
        for chunk in ops.chunks(limit) {
            let mut batch = WriteBatch::new();
            for op in chunk {
                batch.push(op.clone());
            }
            self.store.commit(batch).await?;
        }

        Ok(rooms.len())
    }

    async fn clear_ban(&self, caller: &Caller, user_id: &str) -> ConsoleResult<()> {
        authorize(caller, PolicyAction::Moderate)?;
        self.store
            .update(
                &DocPath::doc(collections::USERS, user_id),
                Patch::new()
                    .set("banned", false)
                    .set_null("bannedAt")
                    .set_null("bannedBy")
                    .set_null("banExpiry"),
            )
            .await
    }

    async fn remove_room(&self, caller: &Caller, room_id: &str) -> ConsoleResult<RemovedRoom> {
        authorize(caller, PolicyAction::Moderate)?;

        let path = DocPath::doc(collections::ROOMS, room_id);
        let room = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| ConsoleError::NotFound(format!("Room {}", room_id)))?;

        // Captured before deletion for the audit trail
        let code = room.str_field("code").map(str::to_string);
        let host = room.str_field("hostName").map(str::to_string);

        let report = cascade::delete_room_cascade(
            self.store.as_ref(),
            &path,
            self.options.cascade_batch_size,
        )
        .await?;

        Ok(RemovedRoom { report, code, host })
    }

    async fn grant_admin(
        &self,
        caller: &Caller,
        email: &str,
        super_admin: bool,
    ) -> ConsoleResult<Admin> {
        authorize(caller, PolicyAction::GrantAdmin { super_admin })?;
        if email.is_empty() {
            return Err(ConsoleError::Validation("Email is required".to_string()));
        }

        let users = self
            .store
            .query(
                &Query::collection(collections::USERS)
                    .where_eq("email", email)
                    .limit(1),
            )
            .await?;
        let user = users.into_iter().next().ok_or_else(|| {
            ConsoleError::NotFound(format!("No user registered with email {}", email))
        })?;
        let user_id = user.id().to_string();

        let path = DocPath::doc(collections::ADMINS, &user_id);
        if self.store.get(&path).await?.is_some() {
            return Err(ConsoleError::Conflict(format!(
                "{} is already an administrator",
                email
            )));
        }

        // Conditional create settles races with concurrent grants
        self.store
            .create(
                &path,
                Patch::new()
                    .set("email", email)
                    .set("superAdmin", super_admin)
                    .set("addedBy", caller.id())
                    .server_timestamp("addedAt"),
            )
            .await?;

        Ok(Admin {
            id: user_id,
            email: Some(email.to_string()),
            super_admin,
            added_by: Some(caller.id().to_string()),
            added_at: Some(Utc::now()),
        })
    }

    /// Returns the revoked admin's email
    async fn revoke_admin(&self, caller: &Caller, admin_id: &str) -> ConsoleResult<Option<String>> {
        let path = DocPath::doc(collections::ADMINS, admin_id);
        let doc = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| ConsoleError::NotFound(format!("Admin {}", admin_id)))?;
        let admin = Admin::from_document(&doc)?;
        authorize(caller, PolicyAction::RevokeAdmin { target: &admin })?;

        self.store.delete(&path).await?;
        Ok(admin.email)
    }

    async fn apply_ban(
        &self,
        caller: &Caller,
        user_id: &str,
        expires: Option<DateTime<Utc>>,
    ) -> ConsoleResult<()> {
        authorize(caller, PolicyAction::Moderate)?;

        let expiry = match expires {
            Some(at) => timestamp_value(at),
            None => serde_json::Value::Null,
        };
        self.store
            .update(
                &DocPath::doc(collections::USERS, user_id),
                Patch::new()
                    .set("banned", true)
                    .server_timestamp("bannedAt")
                    .set("bannedBy", caller.id())
                    .set("banExpiry", expiry),
            )
            .await?;

        let rooms = self.kick(user_id).await?;
        info!("Banned {} and removed them from {} rooms", user_id, rooms);
        Ok(())
    }

    /// Count the outcome and audit successful mutations
    async fn conclude<T>(
        &self,
        caller: &Caller,
        action: AuditAction,
        target: Option<&str>,
        result: ConsoleResult<T>,
    ) -> ConsoleResult<T> {
        match result {
            Ok(value) => {
                metrics::record_moderation_action(action.as_str(), true);
                if let Err(e) = self.audit.record(caller.principal(), &action, target).await {
                    warn!("Failed to write audit entry for {}: {}", action.as_str(), e);
                    metrics::record_audit_failure();
                }
                Ok(value)
            }
            Err(e) => {
                metrics::record_moderation_action(action.as_str(), false);
                warn!(
                    "{} on {} by {} failed: {}",
                    action.as_str(),
                    target.unwrap_or("-"),
                    caller.id(),
                    e
                );
                Err(e)
            }
        }
    }
}
