use serde::{Deserialize, Deserializer, Serialize};

use crate::events::lenient_id;
use crate::models::{RoomId, UserId};

// -- Polling gateway parameters --
//
// Parameters arrive as query-string or form fields, so every value is text on
// the wire. Missing fields deserialize to empty/None and are reported by the
// handler, never by the extractor.

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetMessagesParams {
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub room_id: Option<RoomId>,
    /// Message id (preferred) or legacy timestamp.
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendMessageParams {
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub room_id: Option<RoomId>,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomParams {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscribePushParams {
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub user_id: Option<UserId>,
    /// JSON-encoded browser `PushSubscription`.
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UnsubscribePushParams {
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// The shape `PushSubscription.toJSON()` produces in the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Like [`lenient_id`], but an absent or blank value is `None`.
pub fn lenient_opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "lenient_id")] i64);

    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => serde_json::from_value::<Wrap>(value)
            .map(|w| Some(w.0))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_fields_accept_form_strings() {
        let params: SendMessageParams =
            serde_json::from_value(json!({"room_id": "2", "user_id": "5", "message": "hi"}))
                .unwrap();
        assert_eq!(params.room_id, Some(2));
        assert_eq!(params.user_id, Some(5));
        assert_eq!(params.message, "hi");
    }

    #[test]
    fn missing_and_blank_fields_are_absent() {
        let params: SendMessageParams = serde_json::from_value(json!({"room_id": ""})).unwrap();
        assert_eq!(params.room_id, None);
        assert_eq!(params.user_id, None);
        assert!(params.message.is_empty());
    }

    #[test]
    fn browser_subscription_shape() {
        let sub: BrowserSubscription = serde_json::from_str(
            r#"{"endpoint":"https://push.example/abc","expirationTime":null,"keys":{"p256dh":"BP","auth":"au"}}"#,
        )
        .unwrap();
        assert_eq!(sub.endpoint, "https://push.example/abc");
        assert_eq!(sub.keys.auth, "au");
    }
}
