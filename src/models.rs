/// Document models for users, rooms, admins, audit entries and traffic buckets
use crate::{
    error::ConsoleResult,
    store::{Document, Fields},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection names
pub mod collections {
    pub const USERS: &str = "users";
    pub const ROOMS: &str = "rooms";
    pub const ADMINS: &str = "admins";
    pub const ADMIN_LOGS: &str = "admin_logs";
    pub const TRAFFIC: &str = "traffic";

    /// Per-room presence records
    pub const PARTICIPANTS: &str = "participants";
    pub const MESSAGES: &str = "messages";
    pub const SIGNALING: &str = "signaling";
    pub const ICE_CANDIDATES: &str = "iceCandidates";

    /// Dependent sub-collections of a room, in deletion order
    pub const ROOM_DEPENDENTS: [&str; 4] = [PARTICIPANTS, MESSAGES, SIGNALING, ICE_CANDIDATES];
}

/// Expiry-aware ban check
///
/// A ban whose expiry lies in the past no longer applies, even though the
/// stored flag stays set until the next explicit ban or unban.
pub fn effective_banned(banned: bool, ban_expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    banned && !matches!(ban_expiry, Some(expiry) if expiry < now)
}

/// Platform user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    #[serde(skip_deserializing)]
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub online: bool,
    pub banned: bool,
    pub ban_expiry: Option<DateTime<Utc>>,
    pub banned_at: Option<DateTime<Utc>>,
    pub banned_by: Option<String>,
    pub current_room: Option<String>,
    pub super_admin: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn from_document(doc: &Document) -> ConsoleResult<Self> {
        let mut user: User = doc.decode()?;
        user.id = doc.id().to_string();
        Ok(user)
    }

    pub fn effective_banned(&self, now: DateTime<Utc>) -> bool {
        effective_banned(self.banned, self.ban_expiry, now)
    }
}

/// Call room; its participants, messages, signaling and ICE candidate
/// sub-collections share its lifecycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Room {
    #[serde(skip_deserializing)]
    pub id: String,
    pub code: Option<String>,
    pub host_name: Option<String>,
    pub active: bool,
    pub participants: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_active: Option<DateTime<Utc>>,
}

impl Room {
    pub fn from_document(doc: &Document) -> ConsoleResult<Self> {
        let mut room: Room = doc.decode()?;
        room.id = doc.id().to_string();
        Ok(room)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

/// Administrative capability grant for a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Admin {
    #[serde(skip_deserializing)]
    pub id: String,
    pub email: Option<String>,
    pub super_admin: bool,
    pub added_by: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
}

impl Admin {
    pub fn from_document(doc: &Document) -> ConsoleResult<Self> {
        let mut admin: Admin = doc.decode()?;
        admin.id = doc.id().to_string();
        Ok(admin)
    }
}

/// Stored audit log entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditLogEntry {
    #[serde(skip_deserializing)]
    pub id: String,
    pub admin_id: String,
    pub admin_email: Option<String>,
    pub action: String,
    pub target_id: Option<String>,
    pub details: Fields,
    pub timestamp: Option<DateTime<Utc>>,
    pub ip: Option<String>,
}

impl AuditLogEntry {
    pub fn from_document(doc: &Document) -> ConsoleResult<Self> {
        let mut entry: AuditLogEntry = doc.decode()?;
        entry.id = doc.id().to_string();
        Ok(entry)
    }
}

/// Hourly traffic ledger bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrafficBucket {
    #[serde(skip_deserializing)]
    pub id: String,
    pub date: Option<DateTime<Utc>>,
    pub bytes: u64,
}

impl TrafficBucket {
    pub fn from_document(doc: &Document) -> ConsoleResult<Self> {
        let mut bucket: TrafficBucket = doc.decode()?;
        bucket.id = doc.id().to_string();
        Ok(bucket)
    }
}
