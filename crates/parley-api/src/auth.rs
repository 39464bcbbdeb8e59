use serde_json::json;
use tracing::info;

use parley_types::api::LoginParams;

use crate::AppState;
use crate::response::{ApiError, ApiResult, success};

/// Same identity rules as the socket `auth` command: a known
/// (username, session_id) pair resolves to the existing user.
pub async fn login(state: &AppState, params: LoginParams) -> ApiResult {
    let LoginParams {
        username,
        session_id,
    } = params;
    if username.is_empty() || session_id.is_empty() {
        return Err(ApiError::new("Username and session_id required"));
    }

    let user = state
        .hub
        .blocking(move |db| db.authenticate(&username, &session_id))
        .await
        .map_err(|e| ApiError::masked(e, "Authentication failed"))?;

    info!("User logged in via polling API: {} ({})", user.username, user.id);
    success(json!({
        "user_id": user.id,
        "username": user.username,
    }))
}
