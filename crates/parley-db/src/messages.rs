use chrono::{DateTime, Duration, Utc};
use parley_types::models::{Message, MessageId, RoomId, UserId};
use rusqlite::{Connection, OptionalExtension};
use tracing::error;

use crate::error::{ChatError, is_foreign_key_violation};
use crate::models::{MessageRow, format_timestamp, parse_timestamp};
use crate::sanitize::sanitize;
use crate::Database;

pub const MAX_MESSAGE_LEN: usize = 1000;

/// Messages sent with `room_joined`.
pub const BACKLOG_SIZE: u32 = 20;

/// Resume point for [`Database::since`].
///
/// The message id is authoritative. Timestamps are accepted for older clients
/// but several messages can share one, so a timestamp cursor may skip
/// messages stored within the same microsecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    After(MessageId),
    AfterTime(DateTime<Utc>),
}

impl Cursor {
    /// Parse a `since` parameter: an integer is a message id, anything else
    /// must be a timestamp.
    pub fn parse(text: &str) -> Result<Self, ChatError> {
        let text = text.trim();
        if let Ok(id) = text.parse::<MessageId>() {
            return Ok(Self::After(id));
        }
        parse_timestamp(text)
            .map(Self::AfterTime)
            .ok_or_else(|| ChatError::validation(format!("Invalid cursor: {text}")))
    }
}

const MESSAGE_COLUMNS: &str =
    "m.id, m.room_id, m.user_id, COALESCE(u.username, 'unknown'), m.message, m.created_at";

impl Database {
    // -- Message log --

    /// Persist a message and return its id. The text is trimmed, checked
    /// against the length bound and HTML-escaped before storage.
    pub fn append(&self, room_id: RoomId, user_id: UserId, raw: &str) -> Result<MessageId, ChatError> {
        self.insert_message(room_id, user_id, raw, None)
    }

    /// [`append`](Self::append) with a caller-chosen timestamp. The stored
    /// `created_at` is still moved past the room's newest message.
    pub fn append_at(
        &self,
        room_id: RoomId,
        user_id: UserId,
        raw: &str,
        at: DateTime<Utc>,
    ) -> Result<MessageId, ChatError> {
        self.insert_message(room_id, user_id, raw, Some(at))
    }

    /// Within a room, `created_at` strictly increases with the id. The time
    /// is read under the writer lock and bumped one microsecond past the
    /// room's newest message when the clock has not moved on.
    fn insert_message(
        &self,
        room_id: RoomId,
        user_id: UserId,
        raw: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<MessageId, ChatError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ChatError::validation("Message is empty"));
        }
        if trimmed.chars().count() > MAX_MESSAGE_LEN {
            return Err(ChatError::validation(format!(
                "Message exceeds {MAX_MESSAGE_LEN} characters"
            )));
        }

        let text = sanitize(trimmed);

        self.with_conn_mut(|conn| {
            let at = at.unwrap_or_else(Utc::now);
            let newest: Option<String> = conn.query_row(
                "SELECT MAX(created_at) FROM messages WHERE room_id = ?1",
                [room_id],
                |row| row.get(0),
            )?;
            let floor = newest
                .as_deref()
                .and_then(parse_timestamp)
                .map(|newest| newest + Duration::microseconds(1));
            let created_at = format_timestamp(match floor {
                Some(floor) if floor > at => floor,
                _ => at,
            });

            match conn.execute(
                "INSERT INTO messages (room_id, user_id, message, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![room_id, user_id, text, created_at],
            ) {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(e) if is_foreign_key_violation(&e) => {
                    Err(ChatError::not_found("Unknown room or user"))
                }
                Err(e) => {
                    error!("Failed to store message in room {}: {}", room_id, e);
                    Err(e.into())
                }
            }
        })
    }

    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>, ChatError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages m
                         LEFT JOIN users u ON m.user_id = u.id
                         WHERE m.id = ?1"
                    ),
                    [id],
                    map_message_row,
                )
                .optional()?;
            Ok(row.map(MessageRow::into_model))
        })
    }

    /// The `limit` most recent messages (skipping `offset` newer ones), in
    /// chronological order.
    pub fn page(&self, room_id: RoomId, limit: u32, offset: u32) -> Result<Vec<Message>, ChatError> {
        self.with_conn(|conn| {
            let mut rows = query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     LEFT JOIN users u ON m.user_id = u.id
                     WHERE m.room_id = ?1
                     ORDER BY m.id DESC
                     LIMIT ?2 OFFSET ?3"
                ),
                rusqlite::params![room_id, limit, offset],
            )?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Every message strictly after `cursor`, in chronological order.
    pub fn since(&self, room_id: RoomId, cursor: Cursor) -> Result<Vec<Message>, ChatError> {
        self.with_conn(|conn| match cursor {
            Cursor::After(id) => query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     LEFT JOIN users u ON m.user_id = u.id
                     WHERE m.room_id = ?1 AND m.id > ?2
                     ORDER BY m.id ASC"
                ),
                rusqlite::params![room_id, id],
            ),
            Cursor::AfterTime(at) => query_messages(
                conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     LEFT JOIN users u ON m.user_id = u.id
                     WHERE m.room_id = ?1 AND m.created_at > ?2
                     ORDER BY m.id ASC"
                ),
                rusqlite::params![room_id, format_timestamp(at)],
            ),
        })
    }

    /// Distinct authors of messages in a room after `after`, optionally
    /// leaving one user out.
    pub fn recent_authors(
        &self,
        room_id: RoomId,
        after: DateTime<Utc>,
        exclude: Option<UserId>,
    ) -> Result<Vec<UserId>, ChatError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT user_id FROM messages
                 WHERE room_id = ?1 AND created_at > ?2
                   AND (?3 IS NULL OR user_id != ?3)
                 ORDER BY user_id",
            )?;
            let ids = stmt
                .query_map(
                    rusqlite::params![room_id, format_timestamp(after), exclude],
                    |row| row.get(0),
                )?
                .collect::<Result<Vec<UserId>, _>>()?;
            Ok(ids)
        })
    }
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Message>, ChatError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_message_row)?
        .map(|row| row.map(MessageRow::into_model))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}
