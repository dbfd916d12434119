/// Audit Logger
///
/// Appends one immutable `admin_logs` entry per administrative action. The
/// action-specific details are a tagged enum, flattened into a generic field
/// map only when written to the store.
use crate::{
    attribution::Attribution,
    error::ConsoleResult,
    identity::Principal,
    models::{collections, AuditLogEntry},
    store::{DocPath, DocumentStore, Direction, Fields, Patch, Query},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Audited administrative action and its details
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "details", rename_all = "snake_case")]
pub enum AuditAction {
    BanPermanent,
    BanTemporary {
        expires: DateTime<Utc>,
    },
    Unban,
    DeleteRoom {
        code: Option<String>,
        host: Option<String>,
    },
    AddAdmin {
        email: String,
        #[serde(rename = "superAdmin")]
        super_admin: bool,
    },
    RemoveAdmin {
        email: Option<String>,
    },
    DashboardAccess,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::BanPermanent => "ban_permanent",
            AuditAction::BanTemporary { .. } => "ban_temporary",
            AuditAction::Unban => "unban",
            AuditAction::DeleteRoom { .. } => "delete_room",
            AuditAction::AddAdmin { .. } => "add_admin",
            AuditAction::RemoveAdmin { .. } => "remove_admin",
            AuditAction::DashboardAccess => "dashboard_access",
        }
    }

    /// Details as a generic field map; empty for actions without details
    pub fn details(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => match map.remove("details") {
                Some(Value::Object(details)) => details,
                _ => Fields::new(),
            },
            _ => Fields::new(),
        }
    }
}

/// Writer and reader of the audit trail
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn DocumentStore>,
    attribution: Arc<dyn Attribution>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn DocumentStore>, attribution: Arc<dyn Attribution>) -> Self {
        Self { store, attribution }
    }

    /// Append an entry for `action` performed by `actor`
    pub async fn record(
        &self,
        actor: &Principal,
        action: &AuditAction,
        target_id: Option<&str>,
    ) -> ConsoleResult<DocPath> {
        let ip = self.attribution.resolve_caller_address().await;

        let patch = Patch::new()
            .set("adminId", actor.id.as_str())
            .set("adminEmail", actor.email.clone())
            .set("action", action.as_str())
            .set("targetId", target_id)
            .set("details", Value::Object(action.details()))
            .server_timestamp("timestamp")
            .set("ip", ip);

        let path = self.store.add(collections::ADMIN_LOGS, patch).await?;

        info!(
            "Audit: {} by {} on {}",
            action.as_str(),
            actor.id,
            target_id.unwrap_or("-")
        );

        Ok(path)
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: usize) -> ConsoleResult<Vec<AuditLogEntry>> {
        let docs = self
            .store
            .query(&log_query(limit))
            .await?;

        docs.iter().map(AuditLogEntry::from_document).collect()
    }
}

/// Query for the newest `limit` audit entries
pub fn log_query(limit: usize) -> Query {
    Query::collection(collections::ADMIN_LOGS)
        .order_by("timestamp", Direction::Desc)
        .limit(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{attribution::StaticAttribution, store::MemoryStore};
    use serde_json::json;

    fn logger(store: Arc<MemoryStore>) -> AuditLogger {
        AuditLogger::new(store, Arc::new(StaticAttribution::new("203.0.113.7")))
    }

    #[test]
    fn test_action_tags_and_details() {
        assert_eq!(AuditAction::BanPermanent.as_str(), "ban_permanent");
        assert!(AuditAction::BanPermanent.details().is_empty());

        let details = AuditAction::AddAdmin {
            email: "a@example.com".to_string(),
            super_admin: true,
        }
        .details();
        assert_eq!(details["email"], json!("a@example.com"));
        assert_eq!(details["superAdmin"], json!(true));

        let details = AuditAction::DeleteRoom {
            code: Some("ROOM42".to_string()),
            host: None,
        }
        .details();
        assert_eq!(details["code"], json!("ROOM42"));
        assert_eq!(details["host"], Value::Null);
    }

    #[test]
    fn test_serialized_tag_matches_as_str() {
        let action = AuditAction::BanTemporary {
            expires: Utc::now(),
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], json!(action.as_str()));
    }

    #[tokio::test]
    async fn test_record_writes_entry() {
        let store = Arc::new(MemoryStore::new());
        let audit = logger(store.clone());
        let actor = Principal::new("admin-1", Some("ops@example.com".to_string()));

        audit
            .record(&actor, &AuditAction::Unban, Some("user-9"))
            .await
            .unwrap();

        let entries = audit.recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.admin_id, "admin-1");
        assert_eq!(entry.admin_email.as_deref(), Some("ops@example.com"));
        assert_eq!(entry.action, "unban");
        assert_eq!(entry.target_id.as_deref(), Some("user-9"));
        assert_eq!(entry.ip.as_deref(), Some("203.0.113.7"));
        assert!(entry.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_record_fails_when_store_offline() {
        let store = Arc::new(MemoryStore::new());
        let audit = logger(store.clone());
        store.set_offline(true);

        let result = audit
            .record(&Principal::new("a", None), &AuditAction::DashboardAccess, None)
            .await;
        assert!(result.is_err());
    }
}
