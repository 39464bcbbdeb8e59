pub mod config;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_api::AppState;
use parley_gateway::{ChatHub, handle_connection};

pub const DEFAULT_LOG_FILTER: &str =
    "parley=debug,parley_server=debug,parley_gateway=debug,parley_api=debug,parley_db=info,parley_push=info,tower_http=debug";

/// `/ws` for socket clients, `/api` for pollers, `/health` for probes.
pub fn build_router(hub: ChatHub) -> Router {
    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(hub.clone());

    Router::new()
        .merge(ws_route)
        .merge(parley_api::router(AppState { hub }))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(hub): State<ChatHub>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, hub))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
