use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use parley_db::Database;

/// Background task that prunes push subscriptions nobody refreshed within
/// `retention_days`.
pub async fn run_cleanup_loop(db: Arc<Database>, interval_secs: u64, retention_days: i64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match cleanup_expired(&db, retention_days).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired push subscriptions", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

pub async fn cleanup_expired(db: &Arc<Database>, retention_days: i64) -> anyhow::Result<usize> {
    let db = db.clone();
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    let removed = tokio::task::spawn_blocking(move || db.delete_subscriptions_before(cutoff)).await??;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_subscriptions_survive() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = db.authenticate("alice", "a").unwrap();
        db.upsert_subscription(alice.id, "https://push.example/1", "p", "a").unwrap();

        assert_eq!(cleanup_expired(&db, 30).await.unwrap(), 0);
        assert_eq!(db.subscriptions_for_user(alice.id).unwrap().len(), 1);

        // Negative retention puts the cutoff in the future.
        assert_eq!(cleanup_expired(&db, -1).await.unwrap(), 1);
    }
}
