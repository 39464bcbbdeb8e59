use std::collections::HashMap;

use axum::Form;
use axum::extract::rejection::FormRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::response::{ApiError, ApiResult, into_response};
use crate::{AppState, auth, messages, push, rooms};

/// Request parameters, every value a string as sent by the client.
pub type Params = Map<String, Value>;

pub async fn api_get(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    into_response(dispatch(&state, merge(query, HashMap::new())).await)
}

/// A body that is not a form is treated as empty, so the action still
/// answers with its usual "required" error.
pub async fn api_post(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(fields)) => fields,
        Err(e) => {
            debug!("Ignoring unreadable form body: {}", e);
            HashMap::new()
        }
    };
    into_response(dispatch(&state, merge(query, form)).await)
}

/// Query-string values take precedence over form fields.
fn merge(query: HashMap<String, String>, form: HashMap<String, String>) -> Params {
    let mut params: Params = form.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    params.extend(query.into_iter().map(|(k, v)| (k, Value::String(v))));
    params
}

pub async fn dispatch(state: &AppState, mut params: Params) -> ApiResult {
    let action = match params.remove("action") {
        Some(Value::String(action)) => action,
        _ => String::new(),
    };
    debug!("api action={:?}", action);

    match action.as_str() {
        "login" => auth::login(state, parse(params)?).await,
        "get_rooms" => rooms::get_rooms(state).await,
        "create_room" => rooms::create_room(state, parse(params)?).await,
        "get_messages" => messages::get_messages(state, parse(params)?).await,
        "send_message" => messages::send_message(state, parse(params)?).await,
        "subscribe_push" => push::subscribe(state, parse(params)?).await,
        "unsubscribe_push" => push::unsubscribe(state, parse(params)?).await,
        "get_vapid_key" => push::vapid_key(state),
        _ => Err(ApiError::new("Invalid action")),
    }
}

fn parse<T: DeserializeOwned>(params: Params) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| ApiError::new(format!("Invalid parameters: {e}")))
}
