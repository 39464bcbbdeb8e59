use serde_json::json;

use parley_db::Cursor;
use parley_db::messages::BACKLOG_SIZE;
use parley_types::api::{GetMessagesParams, SendMessageParams};

use crate::AppState;
use crate::response::{ApiError, ApiResult, success};

const MAX_PAGE: i64 = 200;

/// Without `since`, the most recent page (chronological). With `since`,
/// everything after the cursor.
pub async fn get_messages(state: &AppState, params: GetMessagesParams) -> ApiResult {
    let Some(room_id) = params.room_id.filter(|id| *id > 0) else {
        return Err(ApiError::new("Room ID required"));
    };

    let cursor = match params.since.as_deref().map(str::trim) {
        Some(since) if !since.is_empty() => {
            Some(Cursor::parse(since).map_err(|e| ApiError::new(e.to_string()))?)
        }
        _ => None,
    };
    let limit = params
        .limit
        .unwrap_or(i64::from(BACKLOG_SIZE))
        .clamp(1, MAX_PAGE) as u32;
    let offset = params.offset.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32;

    let messages = state
        .hub
        .blocking(move |db| {
            if db.get_room(room_id)?.is_none() {
                return Err(parley_db::ChatError::not_found("Room not found"));
            }
            match cursor {
                Some(cursor) => db.since(room_id, cursor),
                None => db.page(room_id, limit, offset),
            }
        })
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to load messages"))?;

    success(json!({ "messages": messages }))
}

/// Stores the message and returns the stored copy. Connected members of the
/// room receive the same `new_message` a socket send would produce.
pub async fn send_message(state: &AppState, params: SendMessageParams) -> ApiResult {
    let SendMessageParams {
        room_id,
        user_id,
        message,
    } = params;
    let (Some(room_id), Some(user_id)) = (
        room_id.filter(|id| *id > 0),
        user_id.filter(|id| *id > 0),
    ) else {
        return Err(ApiError::new("Room ID, User ID and message required"));
    };
    if message.is_empty() {
        return Err(ApiError::new("Room ID, User ID and message required"));
    }

    let stored = state
        .hub
        .post_message(room_id, user_id, message)
        .await
        .map_err(|e| ApiError::masked(e, "Failed to send message"))?;

    success(json!({ "message": stored }))
}
