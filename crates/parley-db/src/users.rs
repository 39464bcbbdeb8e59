use chrono::Utc;
use parley_types::models::{User, UserId};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{ChatError, is_unique_violation};
use crate::models::{UserRow, format_timestamp};
use crate::Database;

pub const MAX_USERNAME_LEN: usize = 50;
pub const MAX_SESSION_ID_LEN: usize = 100;

impl Database {
    // -- Identity --

    /// Resolve a (username, session token) pair to a user, creating it on
    /// first sight.
    ///
    /// Repeating the same pair always yields the same user. A username that is
    /// already bound to a different token (or a token bound to a different
    /// username) is a `Conflict`, never retried.
    pub fn authenticate(&self, username: &str, session_id: &str) -> Result<User, ChatError> {
        let username = username.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
            return Err(ChatError::validation(format!(
                "Username must be 1-{MAX_USERNAME_LEN} characters"
            )));
        }
        if session_id.is_empty() || session_id.chars().count() > MAX_SESSION_ID_LEN {
            return Err(ChatError::validation("Invalid session id"));
        }

        let now = format_timestamp(Utc::now());

        // Lookup and insert share the writer lock, so two first-sight logins
        // with the same pair cannot both insert.
        self.with_conn_mut(|conn| {
            if let Some(row) = query_user_by_credentials(conn, username, session_id)? {
                conn.execute(
                    "UPDATE users SET last_seen = ?1 WHERE id = ?2",
                    (&now, row.id),
                )?;
                debug!("User {} ({}) re-authenticated", row.username, row.id);
                return Ok(UserRow {
                    last_seen: now.clone(),
                    ..row
                }
                .into_model());
            }

            let inserted = conn.execute(
                "INSERT INTO users (username, session_id, last_seen, created_at) VALUES (?1, ?2, ?3, ?3)",
                (username, session_id, &now),
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(ChatError::Conflict(format!(
                        "Username '{username}' is already taken"
                    )));
                }
                Err(e) => return Err(e.into()),
            }

            let id = conn.last_insert_rowid();
            info!("Created user {} ({})", username, id);
            Ok(UserRow {
                id,
                username: username.to_string(),
                session_id: session_id.to_string(),
                last_seen: now.clone(),
                created_at: now.clone(),
            }
            .into_model())
        })
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>, ChatError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, session_id, last_seen, created_at FROM users WHERE id = ?1",
                    [id],
                    map_user_row,
                )
                .optional()?;
            Ok(row.map(UserRow::into_model))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, ChatError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, session_id, last_seen, created_at FROM users WHERE username = ?1",
                    [username.trim()],
                    map_user_row,
                )
                .optional()?;
            Ok(row.map(UserRow::into_model))
        })
    }
}

fn query_user_by_credentials(
    conn: &Connection,
    username: &str,
    session_id: &str,
) -> Result<Option<UserRow>, ChatError> {
    let row = conn
        .query_row(
            "SELECT id, username, session_id, last_seen, created_at
             FROM users WHERE username = ?1 AND session_id = ?2",
            (username, session_id),
            map_user_row,
        )
        .optional()?;
    Ok(row)
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        session_id: row.get(2)?,
        last_seen: row.get(3)?,
        created_at: row.get(4)?,
    })
}
