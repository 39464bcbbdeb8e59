use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{Message, Room, RoomId, RoomSummary, UserId};

/// Events sent FROM server TO client over the WebSocket gateway.
/// One JSON object per frame, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AuthSuccess { user_id: UserId, username: String },

    AuthError { message: String },

    RoomsList { rooms: Vec<RoomSummary> },

    /// Sent only to the joining connection, with the recent backlog in
    /// chronological order.
    RoomJoined { room: Room, messages: Vec<Message> },

    RoomCreated { room: Room },

    RoomError { message: String },

    /// Delivered to every member of the room, sender included.
    NewMessage { message: Message },

    UserJoined { username: String },

    UserLeft { username: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Auth { username: String, session_id: String },

    JoinRoom {
        #[serde(deserialize_with = "lenient_id")]
        room_id: RoomId,
    },

    Message { message: String },

    GetRooms,

    CreateRoom { name: String },
}

/// Browser clients send ids both as JSON numbers and as numeric strings.
pub fn lenient_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(id) => Ok(id),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {text:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_frames() {
        let auth: ClientCommand =
            serde_json::from_str(r#"{"type":"auth","username":"alice","session_id":"tok1"}"#)
                .unwrap();
        assert_eq!(
            auth,
            ClientCommand::Auth {
                username: "alice".into(),
                session_id: "tok1".into()
            }
        );

        let rooms: ClientCommand = serde_json::from_str(r#"{"type":"get_rooms"}"#).unwrap();
        assert_eq!(rooms, ClientCommand::GetRooms);
    }

    #[test]
    fn join_room_accepts_string_ids() {
        let join: ClientCommand =
            serde_json::from_str(r#"{"type":"join_room","room_id":"7"}"#).unwrap();
        assert_eq!(join, ClientCommand::JoinRoom { room_id: 7 });

        let join: ClientCommand =
            serde_json::from_str(r#"{"type":"join_room","room_id":7}"#).unwrap();
        assert_eq!(join, ClientCommand::JoinRoom { room_id: 7 });

        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"join_room","room_id":"x"}"#).is_err());
    }

    #[test]
    fn untyped_frames_do_not_parse() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"message":"hi"}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type":"shout"}"#).is_err());
        assert!(serde_json::from_str::<ClientCommand>("not json").is_err());
    }

    #[test]
    fn server_events_use_flat_type_tag() {
        let json = serde_json::to_value(ServerEvent::UserLeft {
            username: "bob".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "user_left", "username": "bob"}));

        let json = serde_json::to_value(ServerEvent::AuthSuccess {
            user_id: 3,
            username: "alice".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "auth_success");
        assert_eq!(json["user_id"], 3);
    }
}
