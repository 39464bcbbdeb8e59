use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use parley_db::messages::BACKLOG_SIZE;
use parley_db::{ChatError, Database};
use parley_push::{Notification, PushFanout};
use parley_types::events::{ClientCommand, ServerEvent};
use parley_types::models::{Message, Room, RoomId, UserId};

use crate::registry::{ConnectionId, ConnectionRegistry, Phase, RegistryError};

/// Longest message excerpt put into a push notification body.
const PUSH_PREVIEW_CHARS: usize = 100;

/// The chat protocol state machine. Owns nothing transport-specific: the
/// WebSocket loop and the polling API both drive it.
#[derive(Clone)]
pub struct ChatHub {
    db: Arc<Database>,
    registry: ConnectionRegistry,
    push: PushFanout,
}

impl ChatHub {
    pub fn new(db: Arc<Database>, push: PushFanout) -> Self {
        Self {
            db,
            registry: ConnectionRegistry::new(),
            push,
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn push(&self) -> &PushFanout {
        &self.push
    }

    /// Run a store call on the blocking pool.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Database) -> Result<T, ChatError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| ChatError::Internal(format!("spawn_blocking join error: {e}")))?
    }

    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (conn_id, rx) = self.registry.open().await;
        debug!("Connection {} opened", conn_id);
        (conn_id, rx)
    }

    /// Close path for every transport shutdown, clean or not.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        if let Some(state) = self.registry.close(conn_id).await {
            match state.username {
                Some(name) => info!("{} disconnected ({})", name, conn_id),
                None => debug!("Connection {} closed before authenticating", conn_id),
            }
        }
    }

    /// Apply one client command. Replies and broadcasts go out through the
    /// registry; the returned error is only for logging.
    pub async fn handle_command(
        &self,
        conn_id: ConnectionId,
        command: ClientCommand,
    ) -> Result<(), ChatError> {
        match command {
            ClientCommand::Auth {
                username,
                session_id,
            } => self.handle_auth(conn_id, username, session_id).await,
            ClientCommand::JoinRoom { room_id } => self.handle_join(conn_id, room_id).await,
            ClientCommand::Message { message } => self.handle_message(conn_id, message).await,
            ClientCommand::GetRooms => self.handle_get_rooms(conn_id).await,
            ClientCommand::CreateRoom { name } => self.handle_create_room(conn_id, name).await,
        }
    }

    async fn handle_auth(
        &self,
        conn_id: ConnectionId,
        username: String,
        session_id: String,
    ) -> Result<(), ChatError> {
        let Some(state) = self.registry.state(conn_id).await else {
            return Ok(());
        };
        if state.phase() != Phase::Open {
            self.reply_auth_error(conn_id, "Already authenticated").await;
            return Ok(());
        }

        let user = match self
            .blocking(move |db| db.authenticate(&username, &session_id))
            .await
        {
            Ok(user) => user,
            Err(e) => {
                self.reply_auth_error(conn_id, "Authentication failed").await;
                if e.is_client_error() {
                    debug!("Auth rejected on {}: {}", conn_id, e);
                    return Ok(());
                }
                return Err(e);
            }
        };

        match self
            .registry
            .bind_user(conn_id, user.id, user.username.clone())
            .await
        {
            Ok(()) => {}
            Err(RegistryError::AlreadyAuthenticated) => {
                self.reply_auth_error(conn_id, "Already authenticated").await;
                return Ok(());
            }
            Err(_) => return Ok(()),
        }

        info!("User authenticated: {} ({})", user.username, conn_id);
        self.registry
            .send_to(
                conn_id,
                ServerEvent::AuthSuccess {
                    user_id: user.id,
                    username: user.username,
                },
            )
            .await;
        Ok(())
    }

    async fn reply_auth_error(&self, conn_id: ConnectionId, message: &str) {
        self.registry
            .send_to(
                conn_id,
                ServerEvent::AuthError {
                    message: message.into(),
                },
            )
            .await;
    }

    async fn handle_join(&self, conn_id: ConnectionId, room_id: RoomId) -> Result<(), ChatError> {
        let Some(state) = self.registry.state(conn_id).await else {
            return Ok(());
        };
        if state.phase() == Phase::Open {
            debug!("Ignoring join_room from unauthenticated {}", conn_id);
            return Ok(());
        }

        let Some(room) = self.blocking(move |db| db.get_room(room_id)).await? else {
            debug!("Ignoring join_room for unknown room {}", room_id);
            return Ok(());
        };

        // Backlog and membership change under the room gate, so no message
        // lands between the two.
        let gate = self.registry.room_gate(room_id);
        let _guard = gate.lock().await;

        let messages = self
            .blocking(move |db| db.page(room_id, BACKLOG_SIZE, 0))
            .await?;
        let room_name = room.name.clone();

        match self
            .registry
            .enter_room(conn_id, room_id, ServerEvent::RoomJoined { room, messages })
            .await
        {
            Ok(previous) => {
                info!(
                    "User {} joined room {} (left {:?})",
                    state.username.unwrap_or_default(),
                    room_name,
                    previous
                );
            }
            Err(e) => debug!("join_room on {} dropped: {}", conn_id, e),
        }
        Ok(())
    }

    async fn handle_message(&self, conn_id: ConnectionId, text: String) -> Result<(), ChatError> {
        let Some(state) = self.registry.state(conn_id).await else {
            return Ok(());
        };
        let (Some(user_id), Some(room_id)) = (state.user_id, state.room_id) else {
            debug!("Ignoring message from {} outside a room", conn_id);
            return Ok(());
        };

        match self.post_message(room_id, user_id, text).await {
            Ok(_) => Ok(()),
            Err(ChatError::Validation(reason)) => {
                debug!("Message from {} rejected: {}", conn_id, reason);
                Ok(())
            }
            Err(ChatError::NotFound(reason)) => {
                debug!("Message from {} dropped: {}", conn_id, reason);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_get_rooms(&self, conn_id: ConnectionId) -> Result<(), ChatError> {
        let rooms = self.blocking(|db| db.list_rooms()).await?;
        self.registry
            .send_to(conn_id, ServerEvent::RoomsList { rooms })
            .await;
        Ok(())
    }

    async fn handle_create_room(&self, conn_id: ConnectionId, name: String) -> Result<(), ChatError> {
        let Some(state) = self.registry.state(conn_id).await else {
            return Ok(());
        };
        let Some(user_id) = state.user_id else {
            debug!("Ignoring create_room from unauthenticated {}", conn_id);
            return Ok(());
        };

        match self.create_room(&name, user_id).await {
            Ok(room) => {
                self.registry
                    .send_to(conn_id, ServerEvent::RoomCreated { room })
                    .await;
                Ok(())
            }
            Err(e) => {
                self.registry
                    .send_to(
                        conn_id,
                        ServerEvent::RoomError {
                            message: "Failed to create room".into(),
                        },
                    )
                    .await;
                if e.is_client_error() {
                    debug!("create_room rejected for {}: {}", conn_id, e);
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    pub async fn create_room(&self, name: &str, creator: UserId) -> Result<Room, ChatError> {
        let name = name.to_string();
        let room = self
            .blocking(move |db| db.create_room(&name, Some(creator)))
            .await?;
        info!("Room created: {} by user {}", room.name, creator);
        Ok(room)
    }

    /// Store a message, echo it to every connected member of the room and
    /// start the push fanout. Shared by both transports.
    ///
    /// The work runs on its own task, so a post that has started finishes
    /// even when the caller is dropped.
    pub async fn post_message(
        &self,
        room_id: RoomId,
        user_id: UserId,
        text: String,
    ) -> Result<Message, ChatError> {
        let hub = self.clone();
        tokio::spawn(async move { hub.store_and_broadcast(room_id, user_id, text).await })
            .await
            .map_err(|e| ChatError::Internal(format!("post task join error: {e}")))?
    }

    async fn store_and_broadcast(
        &self,
        room_id: RoomId,
        user_id: UserId,
        text: String,
    ) -> Result<Message, ChatError> {
        let room = self
            .blocking(move |db| db.get_room(room_id))
            .await?
            .ok_or_else(|| ChatError::not_found("Room not found"))?;

        let gate = self.registry.room_gate(room_id);
        let message = {
            let _guard = gate.lock().await;

            let message = self
                .blocking(move |db| {
                    let id = db.append(room_id, user_id, &text)?;
                    db.get_message(id)?
                        .ok_or_else(|| ChatError::Internal(format!("message {id} missing after insert")))
                })
                .await?;

            let delivered = self
                .registry
                .broadcast_to_room(
                    room_id,
                    ServerEvent::NewMessage {
                        message: message.clone(),
                    },
                    None,
                )
                .await;
            debug!(
                "Message {} from {} in room {} delivered to {} connection(s)",
                message.id, message.username, room.name, delivered
            );
            message
        };

        self.spawn_push(&room, &message);
        Ok(message)
    }

    fn spawn_push(&self, room: &Room, message: &Message) {
        let notification = Notification {
            title: format!("New message in {}", room.name),
            body: format!("{}: {}", message.username, preview(&message.message)),
            data: serde_json::json!({
                "room_id": room.id,
                "message_id": message.id,
            }),
        };
        let handle = self
            .push
            .spawn_notify_room(room.id, notification, Some(message.user_id));
        let room_id = room.id;
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                error!("Push fanout task for room {} failed: {}", room_id, e);
            }
        });
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PUSH_PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PUSH_PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
