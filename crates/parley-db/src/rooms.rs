use chrono::{DateTime, Duration, Utc};
use parley_types::models::{Room, RoomId, RoomSummary, UserId};
use rusqlite::OptionalExtension;
use tracing::info;

use crate::error::{ChatError, is_foreign_key_violation, is_unique_violation};
use crate::models::{RoomRow, format_timestamp};
use crate::Database;

pub const MAX_ROOM_NAME_LEN: usize = 100;

/// Authors who posted within this window count as a room's active users.
pub fn active_window() -> Duration {
    Duration::hours(1)
}

const ROOM_COLUMNS: &str = "r.id, r.name, r.created_by, u.username, r.created_at";

impl Database {
    // -- Rooms --

    /// All rooms ordered by name, each with its trailing-hour author count.
    pub fn list_rooms(&self) -> Result<Vec<RoomSummary>, ChatError> {
        self.list_rooms_at(Utc::now())
    }

    pub fn list_rooms_at(&self, now: DateTime<Utc>) -> Result<Vec<RoomSummary>, ChatError> {
        let cutoff = format_timestamp(now - active_window());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ROOM_COLUMNS}, COUNT(DISTINCT m.user_id)
                 FROM rooms r
                 LEFT JOIN users u ON r.created_by = u.id
                 LEFT JOIN messages m ON r.id = m.room_id AND m.created_at > ?1
                 GROUP BY r.id
                 ORDER BY r.name"
            ))?;

            let rooms = stmt
                .query_map([&cutoff], |row| {
                    Ok(map_room_row(row)?.into_summary(row.get(5)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rooms)
        })
    }

    /// Create a room. Duplicate names are a `Conflict`; names are trimmed and
    /// must be 1-100 characters.
    pub fn create_room(&self, name: &str, creator: Option<UserId>) -> Result<Room, ChatError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_LEN {
            return Err(ChatError::validation(format!(
                "Room name must be 1-{MAX_ROOM_NAME_LEN} characters"
            )));
        }

        let now = format_timestamp(Utc::now());
        let id = self.with_conn_mut(|conn| {
            match conn.execute(
                "INSERT INTO rooms (name, created_by, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, creator, now],
            ) {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(e) if is_unique_violation(&e) => Err(ChatError::Conflict(format!(
                    "Room '{name}' already exists"
                ))),
                Err(e) if is_foreign_key_violation(&e) => {
                    Err(ChatError::not_found("Unknown user"))
                }
                Err(e) => Err(e.into()),
            }
        })?;

        info!("Room created: {} ({})", name, id);
        self.get_room(id)?
            .ok_or_else(|| ChatError::not_found(format!("Room {id} vanished after insert")))
    }

    pub fn get_room(&self, id: RoomId) -> Result<Option<Room>, ChatError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {ROOM_COLUMNS} FROM rooms r
                         LEFT JOIN users u ON r.created_by = u.id
                         WHERE r.id = ?1"
                    ),
                    [id],
                    map_room_row,
                )
                .optional()?;
            Ok(row.map(RoomRow::into_model))
        })
    }

    pub fn get_room_by_name(&self, name: &str) -> Result<Option<Room>, ChatError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {ROOM_COLUMNS} FROM rooms r
                         LEFT JOIN users u ON r.created_by = u.id
                         WHERE r.name = ?1"
                    ),
                    [name.trim()],
                    map_room_row,
                )
                .optional()?;
            Ok(row.map(RoomRow::into_model))
        })
    }

    /// Insert bootstrap rooms that do not exist yet. Returns how many were added.
    pub fn seed_rooms<S: AsRef<str>>(&self, names: &[S]) -> Result<usize, ChatError> {
        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            let mut added = 0;
            for name in names {
                let name = name.as_ref().trim();
                if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_LEN {
                    continue;
                }
                added += conn.execute(
                    "INSERT OR IGNORE INTO rooms (name, created_by, created_at) VALUES (?1, NULL, ?2)",
                    (name, &now),
                )?;
            }
            Ok(added)
        })
    }
}

fn map_room_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoomRow> {
    Ok(RoomRow {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        created_by_username: row.get(3)?,
        created_at: row.get(4)?,
    })
}
