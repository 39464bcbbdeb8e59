//! Database row types. These map directly to SQLite rows and are kept distinct
//! from the parley-types wire models so the schema can evolve on its own.

use chrono::{DateTime, NaiveDateTime, Utc};
use parley_types::models::{Message, PushSubscription, Room, RoomSummary, User};
use tracing::warn;

/// Fixed-width UTC timestamp; lexical order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts the stored format, SQLite's `CURRENT_TIMESTAMP` format and RFC 3339.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

fn stored_timestamp(text: &str, what: &str) -> DateTime<Utc> {
    parse_timestamp(text).unwrap_or_else(|| {
        warn!("Corrupt timestamp '{}' on {}", text, what);
        DateTime::default()
    })
}

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub session_id: String,
    pub last_seen: String,
    pub created_at: String,
}

impl UserRow {
    pub fn into_model(self) -> User {
        User {
            last_seen: stored_timestamp(&self.last_seen, "user"),
            created_at: stored_timestamp(&self.created_at, "user"),
            id: self.id,
            username: self.username,
        }
    }
}

pub struct RoomRow {
    pub id: i64,
    pub name: String,
    pub created_by: Option<i64>,
    pub created_by_username: Option<String>,
    pub created_at: String,
}

impl RoomRow {
    pub fn into_model(self) -> Room {
        Room {
            created_at: stored_timestamp(&self.created_at, "room"),
            id: self.id,
            name: self.name,
            created_by: self.created_by,
            created_by_username: self.created_by_username,
        }
    }

    pub fn into_summary(self, active_users: i64) -> RoomSummary {
        RoomSummary {
            room: self.into_model(),
            active_users,
        }
    }
}

pub struct MessageRow {
    pub id: i64,
    pub room_id: i64,
    pub user_id: i64,
    pub username: String,
    pub message: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_model(self) -> Message {
        Message {
            created_at: stored_timestamp(&self.created_at, "message"),
            id: self.id,
            room_id: self.room_id,
            user_id: self.user_id,
            username: self.username,
            message: self.message,
        }
    }
}

pub struct SubscriptionRow {
    pub user_id: i64,
    pub endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
}

impl SubscriptionRow {
    pub fn into_model(self) -> PushSubscription {
        PushSubscription {
            user_id: self.user_id,
            endpoint: self.endpoint,
            p256dh_key: self.p256dh_key,
            auth_key: self.auth_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stored_format_is_fixed_width_and_parses_back() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let text = format_timestamp(at);
        assert_eq!(text, "2024-03-09 07:05:01.000000");
        assert_eq!(parse_timestamp(&text), Some(at));
    }

    #[test]
    fn parses_sqlite_and_rfc3339_forms() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(parse_timestamp("2024-03-09 07:05:01"), Some(at));
        assert_eq!(parse_timestamp("2024-03-09T07:05:01Z"), Some(at));
        assert_eq!(parse_timestamp("2024-03-09T09:05:01+02:00"), Some(at));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
