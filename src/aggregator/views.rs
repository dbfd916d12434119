/// Derived views recomputed from full snapshots
///
/// Counters are taken from the raw documents so that every document in a
/// snapshot is counted; only the table rows depend on typed decoding.
use crate::{
    metrics,
    models::{effective_banned, Admin, AuditLogEntry, Room, User},
    store::{patch::parse_timestamp, Document},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Hourly slots in the activity histogram
pub const ACTIVITY_SLOTS: usize = 24;

/// Decode every document, skipping malformed ones
fn decode_rows<T>(
    docs: &[Document],
    decode: impl Fn(&Document) -> crate::error::ConsoleResult<T>,
) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode(doc) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!("Skipping malformed document {}: {}", doc.path, e);
                metrics::record_malformed_document(doc.path.collection());
                None
            }
        })
        .collect()
}

fn timestamp_field(doc: &Document, field: &str) -> Option<DateTime<Utc>> {
    doc.get(field).and_then(parse_timestamp)
}

/// A user row with its expiry-aware ban flag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    #[serde(flatten)]
    pub user: User,
    pub effective_banned: bool,
}

/// Users table and its counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersView {
    pub rows: Vec<UserRow>,
    pub total_users: usize,
    pub online_users: usize,
    /// Raw `banned` flags, including lapsed temporary bans
    pub banned_users: usize,
    /// Bans still in force at snapshot time
    pub effectively_banned_users: usize,
    /// Users last seen per hour; slot 23 is the most recent hour
    pub activity: [usize; ACTIVITY_SLOTS],
    pub degraded: bool,
}

impl UsersView {
    pub fn from_snapshot(docs: &[Document], now: DateTime<Utc>) -> Self {
        let mut view = UsersView {
            total_users: docs.len(),
            ..UsersView::default()
        };

        for doc in docs {
            let banned = doc.flag("banned");
            if doc.flag("online") {
                view.online_users += 1;
            }
            if banned {
                view.banned_users += 1;
            }
            if effective_banned(banned, timestamp_field(doc, "banExpiry"), now) {
                view.effectively_banned_users += 1;
            }
            if let Some(last_seen) = timestamp_field(doc, "lastSeen") {
                let hours_ago = (now - last_seen).num_hours();
                if (0..ACTIVITY_SLOTS as i64).contains(&hours_ago) {
                    view.activity[ACTIVITY_SLOTS - 1 - hours_ago as usize] += 1;
                }
            }
        }

        view.rows = decode_rows(docs, User::from_document)
            .into_iter()
            .map(|user| UserRow {
                effective_banned: user.effective_banned(now),
                user,
            })
            .collect();

        view
    }

    /// Empty view shown while the users feed is failing
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }

    /// Case-insensitive match over name, id, email and current room
    pub fn search(&self, term: &str) -> Vec<&UserRow> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.rows.iter().collect();
        }

        self.rows
            .iter()
            .filter(|row| {
                let user = &row.user;
                [
                    Some(user.id.as_str()),
                    user.display_name.as_deref(),
                    user.email.as_deref(),
                    user.current_room.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&term))
            })
            .collect()
    }
}

/// Active rooms bucketed by participant count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoomSizeDistribution {
    /// No participants
    pub empty: usize,
    /// 1 to 2 participants
    pub small: usize,
    /// 3 to 5 participants
    pub medium: usize,
    /// 6 or more participants
    pub large: usize,
}

impl RoomSizeDistribution {
    fn record(&mut self, participants: usize) {
        match participants {
            0 => self.empty += 1,
            1..=2 => self.small += 1,
            3..=5 => self.medium += 1,
            _ => self.large += 1,
        }
    }
}

/// Active rooms table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsView {
    pub rows: Vec<Room>,
    pub active_rooms: usize,
    pub sizes: RoomSizeDistribution,
    pub degraded: bool,
}

impl RoomsView {
    pub fn from_snapshot(docs: &[Document]) -> Self {
        let mut sizes = RoomSizeDistribution::default();
        for doc in docs {
            let participants = doc
                .get("participants")
                .and_then(serde_json::Value::as_array)
                .map_or(0, Vec::len);
            sizes.record(participants);
        }

        Self {
            rows: decode_rows(docs, Room::from_document),
            active_rooms: docs.len(),
            sizes,
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminsView {
    pub rows: Vec<Admin>,
    pub degraded: bool,
}

impl AdminsView {
    pub fn from_snapshot(docs: &[Document]) -> Self {
        Self {
            rows: decode_rows(docs, Admin::from_document),
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}

/// Newest audit entries first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogsView {
    pub entries: Vec<AuditLogEntry>,
    pub degraded: bool,
}

impl LogsView {
    pub fn from_snapshot(docs: &[Document]) -> Self {
        Self {
            entries: decode_rows(docs, AuditLogEntry::from_document),
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }
}

/// Headline counters of the console
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub online_users: usize,
    pub banned_users: usize,
    pub effectively_banned_users: usize,
    pub active_rooms: usize,
    /// The users feed failed; user counters are zeroed until it recovers
    pub users_degraded: bool,
    /// The rooms feed failed; `active_rooms` is zeroed until it recovers
    pub rooms_degraded: bool,
    pub updated_at: Option<DateTime<Utc>>,
}
