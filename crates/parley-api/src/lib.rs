//! Request/response gateway for clients without a live socket.
//!
//! Everything goes through `/api` with an `action` parameter, read from the
//! query string or a form body. Responses are always HTTP 200 with either
//! `{"success": true, ...}` or `{"error": "..."}`.

pub mod auth;
pub mod dispatch;
pub mod messages;
pub mod push;
pub mod response;
pub mod rooms;

use axum::Router;
use axum::routing::get;

use parley_gateway::ChatHub;

#[derive(Clone)]
pub struct AppState {
    pub hub: ChatHub,
}

/// `/api` for GET and POST.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api", get(dispatch::api_get).post(dispatch::api_post))
        .with_state(state)
}
