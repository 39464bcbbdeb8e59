use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parley_db::{ChatError, Database};
use parley_types::models::{PushSubscription, RoomId, UserId};

use crate::transport::{DeliveryError, PushTransport};
use crate::vapid::VapidKeys;

/// Authors who posted within this window receive room notifications.
pub fn recipient_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl Notification {
    /// The JSON body handed to the transport.
    pub fn payload(&self) -> String {
        serde_json::json!({
            "title": self.title,
            "body": self.body,
            "data": self.data,
            "timestamp": Utc::now().timestamp(),
        })
        .to_string()
    }
}

/// Outcome of one room fanout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct PushFanout {
    inner: Arc<FanoutInner>,
}

struct FanoutInner {
    db: Arc<Database>,
    transport: Arc<dyn PushTransport>,
    vapid: VapidKeys,
}

impl PushFanout {
    pub fn new(db: Arc<Database>, transport: Arc<dyn PushTransport>, vapid: VapidKeys) -> Self {
        Self {
            inner: Arc::new(FanoutInner {
                db,
                transport,
                vapid,
            }),
        }
    }

    pub fn vapid_public_key(&self) -> &str {
        self.inner.vapid.public_key()
    }

    pub fn subscribe(
        &self,
        user_id: UserId,
        endpoint: &str,
        p256dh_key: &str,
        auth_key: &str,
    ) -> Result<(), ChatError> {
        self.inner
            .db
            .upsert_subscription(user_id, endpoint, p256dh_key, auth_key)?;
        info!("User {} subscribed to push at {}", user_id, endpoint);
        Ok(())
    }

    pub fn unsubscribe(&self, user_id: UserId, endpoint: Option<&str>) -> Result<usize, ChatError> {
        let removed = self.inner.db.delete_subscriptions(user_id, endpoint)?;
        info!("User {} removed {} push subscription(s)", user_id, removed);
        Ok(removed)
    }

    /// Run [`notify_room`](Self::notify_room) on its own task. The caller does
    /// not need to await the handle.
    pub fn spawn_notify_room(
        &self,
        room_id: RoomId,
        notification: Notification,
        exclude: Option<UserId>,
    ) -> JoinHandle<FanoutReport> {
        let fanout = self.clone();
        tokio::spawn(async move { fanout.notify_room(room_id, &notification, exclude).await })
    }

    /// Notify everyone who posted in the room during the last 24 hours,
    /// except `exclude`. Never fails: errors are logged and counted.
    pub async fn notify_room(
        &self,
        room_id: RoomId,
        notification: &Notification,
        exclude: Option<UserId>,
    ) -> FanoutReport {
        let db = self.inner.db.clone();
        let cutoff = Utc::now() - recipient_window();
        let recipients = tokio::task::spawn_blocking(move || {
            db.recent_authors(room_id, cutoff, exclude)
        })
        .await;

        let recipients = match recipients {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                error!("Push fanout for room {}: recipient lookup failed: {}", room_id, e);
                return FanoutReport::default();
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return FanoutReport::default();
            }
        };

        let payload = notification.payload();
        let mut report = FanoutReport {
            recipients: recipients.len(),
            ..FanoutReport::default()
        };

        for user_id in recipients {
            let (delivered, failed) = self.notify_user(user_id, &payload).await;
            report.delivered += delivered;
            report.failed += failed;
        }

        debug!(
            "Push fanout for room {}: {} recipients, {} delivered, {} failed",
            room_id, report.recipients, report.delivered, report.failed
        );
        report
    }

    /// Deliver to every subscription a user holds. Returns (delivered, failed).
    pub async fn notify_user(&self, user_id: UserId, payload: &str) -> (usize, usize) {
        let db = self.inner.db.clone();
        let subscriptions =
            match tokio::task::spawn_blocking(move || db.subscriptions_for_user(user_id)).await {
                Ok(Ok(subs)) => subs,
                Ok(Err(e)) => {
                    warn!("Push: subscription lookup for user {} failed: {}", user_id, e);
                    return (0, 0);
                }
                Err(e) => {
                    error!("spawn_blocking join error: {}", e);
                    return (0, 0);
                }
            };

        let mut delivered = 0;
        let mut failed = 0;
        for subscription in &subscriptions {
            match self.inner.transport.deliver(subscription, payload).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    failed += 1;
                    warn!(
                        "Push delivery to user {} at {} failed: {}",
                        user_id, subscription.endpoint, err
                    );
                    if matches!(err, DeliveryError::Gone) {
                        self.forget(subscription).await;
                    }
                }
            }
        }
        (delivered, failed)
    }

    async fn forget(&self, subscription: &PushSubscription) {
        let db = self.inner.db.clone();
        let user_id = subscription.user_id;
        let endpoint = subscription.endpoint.clone();
        let result = tokio::task::spawn_blocking(move || {
            db.delete_subscriptions(user_id, Some(&endpoint))
        })
        .await;
        if let Ok(Err(e)) = result {
            warn!("Push: failed to drop dead subscription: {}", e);
        }
    }
}
