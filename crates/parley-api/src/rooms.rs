use serde_json::json;

use parley_types::api::CreateRoomParams;

use crate::AppState;
use crate::response::{ApiError, ApiResult, success};

pub async fn get_rooms(state: &AppState) -> ApiResult {
    let rooms = state
        .hub
        .blocking(|db| db.list_rooms())
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to load rooms"))?;
    success(json!({ "rooms": rooms }))
}

pub async fn create_room(state: &AppState, params: CreateRoomParams) -> ApiResult {
    let (name, Some(user_id)) = (params.name, params.user_id.filter(|id| *id > 0)) else {
        return Err(ApiError::new("Room name and user ID required"));
    };
    if name.is_empty() {
        return Err(ApiError::new("Room name and user ID required"));
    }

    let room = state
        .hub
        .create_room(&name, user_id)
        .await
        .map_err(|e| ApiError::masked(e, "Failed to create room"))?;
    success(json!({ "room": room }))
}
