use async_trait::async_trait;
use parley_types::models::PushSubscription;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The push service reports the subscription no longer exists.
    #[error("Subscription gone")]
    Gone,

    /// The push service refused the message.
    #[error("Rejected by push service: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Delivers one encoded payload to one subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &str,
    ) -> Result<(), DeliveryError>;
}

/// Stub transport: logs the delivery it would make and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyTransport;

#[async_trait]
impl PushTransport for LogOnlyTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &str,
    ) -> Result<(), DeliveryError> {
        info!(
            "[log-only push] user {} -> {} ({} byte payload)",
            subscription.user_id,
            subscription.endpoint,
            payload.len()
        );
        tracing::debug!("[log-only push] payload: {}", payload);
        Ok(())
    }
}
