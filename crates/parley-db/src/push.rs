use chrono::{DateTime, Utc};
use parley_types::models::{PushSubscription, UserId};
use tracing::info;

use crate::error::{ChatError, is_foreign_key_violation};
use crate::models::{SubscriptionRow, format_timestamp};
use crate::Database;

impl Database {
    // -- Push subscriptions --

    /// Insert or refresh the subscription keyed by (user, endpoint).
    pub fn upsert_subscription(
        &self,
        user_id: UserId,
        endpoint: &str,
        p256dh_key: &str,
        auth_key: &str,
    ) -> Result<(), ChatError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ChatError::validation("Subscription endpoint required"));
        }
        if p256dh_key.is_empty() || auth_key.is_empty() {
            return Err(ChatError::validation("Subscription keys required"));
        }

        let now = format_timestamp(Utc::now());
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions (user_id, endpoint, p256dh_key, auth_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, endpoint) DO UPDATE SET
                     p256dh_key = excluded.p256dh_key,
                     auth_key = excluded.auth_key,
                     created_at = excluded.created_at",
                rusqlite::params![user_id, endpoint, p256dh_key, auth_key, now],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ChatError::not_found("Unknown user")
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    pub fn subscriptions_for_user(&self, user_id: UserId) -> Result<Vec<PushSubscription>, ChatError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, endpoint, p256dh_key, auth_key
                 FROM push_subscriptions WHERE user_id = ?1 ORDER BY id",
            )?;
            let subs = stmt
                .query_map([user_id], |row| {
                    Ok(SubscriptionRow {
                        user_id: row.get(0)?,
                        endpoint: row.get(1)?,
                        p256dh_key: row.get(2)?,
                        auth_key: row.get(3)?,
                    }
                    .into_model())
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(subs)
        })
    }

    /// Delete one subscription, or all of a user's when `endpoint` is `None`.
    /// Returns the number removed.
    pub fn delete_subscriptions(
        &self,
        user_id: UserId,
        endpoint: Option<&str>,
    ) -> Result<usize, ChatError> {
        self.with_conn_mut(|conn| {
            let removed = match endpoint {
                Some(endpoint) => conn.execute(
                    "DELETE FROM push_subscriptions WHERE user_id = ?1 AND endpoint = ?2",
                    (user_id, endpoint.trim()),
                )?,
                None => conn.execute(
                    "DELETE FROM push_subscriptions WHERE user_id = ?1",
                    [user_id],
                )?,
            };
            Ok(removed)
        })
    }

    /// Drop subscriptions not refreshed since `cutoff`.
    pub fn delete_subscriptions_before(&self, cutoff: DateTime<Utc>) -> Result<usize, ChatError> {
        let removed = self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "DELETE FROM push_subscriptions WHERE created_at < ?1",
                [format_timestamp(cutoff)],
            )?)
        })?;
        if removed > 0 {
            info!("Removed {} stale push subscriptions", removed);
        }
        Ok(removed)
    }
}
