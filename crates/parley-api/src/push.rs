use serde_json::json;

use parley_types::api::{BrowserSubscription, SubscribePushParams, UnsubscribePushParams};

use crate::AppState;
use crate::response::{ApiError, ApiResult, success};

pub async fn subscribe(state: &AppState, params: SubscribePushParams) -> ApiResult {
    let Some(user_id) = params.user_id.filter(|id| *id > 0) else {
        return Err(ApiError::new("User ID and subscription required"));
    };
    if params.subscription.trim().is_empty() {
        return Err(ApiError::new("User ID and subscription required"));
    }
    let subscription: BrowserSubscription = serde_json::from_str(&params.subscription)
        .map_err(|_| ApiError::new("Invalid subscription"))?;

    let push = state.hub.push().clone();
    tokio::task::spawn_blocking(move || {
        push.subscribe(
            user_id,
            &subscription.endpoint,
            &subscription.keys.p256dh,
            &subscription.keys.auth,
        )
    })
    .await
    .map_err(|e| ApiError::new(format!("Failed to save subscription: {e}")))?
    .map_err(|e| ApiError::from_chat(e, "Failed to save subscription"))?;

    success(json!({}))
}

/// Without `endpoint`, removes every subscription the user holds.
pub async fn unsubscribe(state: &AppState, params: UnsubscribePushParams) -> ApiResult {
    let Some(user_id) = params.user_id.filter(|id| *id > 0) else {
        return Err(ApiError::new("User ID required"));
    };
    let endpoint = params.endpoint.filter(|e| !e.trim().is_empty());

    let push = state.hub.push().clone();
    let removed = tokio::task::spawn_blocking(move || push.unsubscribe(user_id, endpoint.as_deref()))
        .await
        .map_err(|e| ApiError::new(format!("Failed to remove subscription: {e}")))?
        .map_err(|e| ApiError::from_chat(e, "Failed to remove subscription"))?;

    success(json!({ "removed": removed }))
}

pub fn vapid_key(state: &AppState) -> ApiResult {
    success(json!({ "vapid_public_key": state.hub.push().vapid_public_key() }))
}
