use axum::Json;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use tracing::{debug, error};

use parley_db::ChatError;

/// Fields of a successful reply; `success: true` is added on the way out.
pub type ApiResult = Result<Map<String, Value>, ApiError>;

/// A failed action. Still a 200: the polling client only looks at `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError(pub String);

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Report any store failure as `message`. Client errors are logged at
    /// debug, everything else as an error.
    pub fn masked(err: ChatError, message: &str) -> Self {
        if err.is_client_error() {
            debug!("{}: {}", message, err);
        } else {
            error!("{}: {}", message, err);
        }
        Self::new(message)
    }

    /// Like [`masked`](Self::masked), but an unknown room or user keeps its
    /// own message.
    pub fn from_chat(err: ChatError, fallback: &str) -> Self {
        match err {
            ChatError::NotFound(message) => Self(message),
            err => Self::masked(err, fallback),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Json(json!({ "error": self.0 })).into_response()
    }
}

pub fn success(fields: Value) -> ApiResult {
    let mut body = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert("success".into(), Value::Bool(true));
    Ok(body)
}

pub fn into_response(result: ApiResult) -> Response {
    match result {
        Ok(body) => Json(Value::Object(body)).into_response(),
        Err(err) => err.into_response(),
    }
}
