use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use chatty_db::models::{MessageRow, UserRow};
use chatty_types::models::{AuthProvider, Message, User};

/// Row-to-API conversions. Corrupt columns are logged and defaulted rather
/// than failing the whole request, matching how reads are handled elsewhere.

pub fn user_from_row(row: UserRow) -> User {
    User {
        id: parse_uuid(&row.id, "user id", &row.id),
        username: row.username,
        email: row.email,
        profile_pic: row.profile_pic,
        auth_provider: match row.auth_provider.as_str() {
            "google" => AuthProvider::Google,
            _ => AuthProvider::Email,
        },
        created_at: parse_timestamp(&row.created_at, "user", &row.id),
    }
}

pub fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id", &row.id),
        sender_id: parse_uuid(&row.sender_id, "sender_id", &row.id),
        receiver_id: parse_uuid(&row.receiver_id, "receiver_id", &row.id),
        text: row.text,
        image: row.image,
        created_at: parse_timestamp(&row.created_at, "message", &row.id),
    }
}

fn parse_uuid(value: &str, what: &str, record: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on record '{}': {}", what, value, record, e);
        Uuid::default()
    })
}

fn parse_timestamp(value: &str, what: &str, record: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {} '{}': {}", value, what, record, e);
            DateTime::default()
        })
}
