use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::ServerEvent;
use parley_types::models::{RoomId, UserId};

pub type ConnectionId = Uuid;

/// Lifecycle of a live connection. A closed connection is simply absent
/// from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Open,
    Authenticated,
    InRoom,
}

/// Everything the server knows about one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub connection_id: ConnectionId,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub room_id: Option<RoomId>,
}

impl ConnectionState {
    fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user_id: None,
            username: None,
            room_id: None,
        }
    }

    pub fn phase(&self) -> Phase {
        match (self.user_id, self.room_id) {
            (None, _) => Phase::Open,
            (Some(_), None) => Phase::Authenticated,
            (Some(_), Some(_)) => Phase::InRoom,
        }
    }

    fn display_name(&self) -> String {
        self.username.clone().unwrap_or_default()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown connection")]
    UnknownConnection,

    #[error("Connection is not authenticated")]
    NotAuthenticated,

    #[error("Connection is already authenticated")]
    AlreadyAuthenticated,
}

struct ConnectionEntry {
    state: ConnectionState,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
struct RegistryInner {
    /// connection_id -> state + outbound channel
    connections: HashMap<ConnectionId, ConnectionEntry>,

    /// room_id -> member connection ids
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RegistryInner {
    /// Enqueue `event` for every member of `room_id` except `exclude`.
    /// Callers hold the registry lock, so the member set cannot change
    /// while this runs.
    fn fan_out(&self, room_id: RoomId, event: &ServerEvent, exclude: Option<ConnectionId>) -> usize {
        let Some(members) = self.rooms.get(&room_id) else {
            return 0;
        };

        let mut delivered = 0;
        for conn_id in members {
            if Some(*conn_id) == exclude {
                continue;
            }
            if let Some(entry) = self.connections.get(conn_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Remove a connection from its room and tell the remaining members.
    fn detach_from_room(&mut self, conn_id: ConnectionId) -> Option<RoomId> {
        let entry = self.connections.get_mut(&conn_id)?;
        let room_id = entry.state.room_id.take()?;
        let username = entry.state.display_name();

        if let Some(members) = self.rooms.get_mut(&room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                self.rooms.remove(&room_id);
            }
        }

        self.fan_out(room_id, &ServerEvent::UserLeft { username }, Some(conn_id));
        Some(room_id)
    }
}

/// Tracks every live connection, which user it is bound to and which room
/// it is in, and fans events out to room members.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,

    /// Per-room serialization of "read or write the log, then touch
    /// membership or broadcast".
    gates: Arc<std::sync::Mutex<HashMap<RoomId, Arc<Mutex<()>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new unauthenticated connection. Returns its id and the
    /// receiver for events addressed to it.
    pub async fn open(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.connections.insert(
            conn_id,
            ConnectionEntry {
                state: ConnectionState::new(conn_id),
                tx,
            },
        );
        (conn_id, rx)
    }

    pub async fn state(&self, conn_id: ConnectionId) -> Option<ConnectionState> {
        self.inner
            .read()
            .await
            .connections
            .get(&conn_id)
            .map(|entry| entry.state.clone())
    }

    /// Open -> Authenticated.
    pub async fn bind_user(
        &self,
        conn_id: ConnectionId,
        user_id: UserId,
        username: String,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .connections
            .get_mut(&conn_id)
            .ok_or(RegistryError::UnknownConnection)?;
        if entry.state.user_id.is_some() {
            return Err(RegistryError::AlreadyAuthenticated);
        }
        entry.state.user_id = Some(user_id);
        entry.state.username = Some(username);
        Ok(())
    }

    /// Send an event to one connection. Returns false if it is gone.
    pub async fn send_to(&self, conn_id: ConnectionId, event: ServerEvent) -> bool {
        self.inner
            .read()
            .await
            .connections
            .get(&conn_id)
            .is_some_and(|entry| entry.tx.send(event).is_ok())
    }

    /// Authenticated | InRoom -> InRoom(room_id).
    ///
    /// In one critical section: leaves the current room (others there get
    /// `user_left`), joins the new one, hands `joined` to the connection and
    /// sends `user_joined` to the other members. Joining the current room
    /// again only re-sends `joined`. Returns the room left, if any.
    pub async fn enter_room(
        &self,
        conn_id: ConnectionId,
        room_id: RoomId,
        joined: ServerEvent,
    ) -> Result<Option<RoomId>, RegistryError> {
        let mut inner = self.inner.write().await;
        let (current, username) = {
            let state = &inner
                .connections
                .get(&conn_id)
                .ok_or(RegistryError::UnknownConnection)?
                .state;
            if state.user_id.is_none() {
                return Err(RegistryError::NotAuthenticated);
            }
            (state.room_id, state.display_name())
        };

        let previous = match current {
            Some(current) if current != room_id => inner.detach_from_room(conn_id),
            _ => None,
        };

        inner.rooms.entry(room_id).or_default().insert(conn_id);
        if let Some(entry) = inner.connections.get_mut(&conn_id) {
            entry.state.room_id = Some(room_id);
            let _ = entry.tx.send(joined);
        }
        if current != Some(room_id) {
            inner.fan_out(room_id, &ServerEvent::UserJoined { username }, Some(conn_id));
        }

        Ok(previous)
    }

    /// InRoom -> Authenticated. Returns the room left, if any.
    pub async fn leave_room(&self, conn_id: ConnectionId) -> Result<Option<RoomId>, RegistryError> {
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&conn_id) {
            return Err(RegistryError::UnknownConnection);
        }
        Ok(inner.detach_from_room(conn_id))
    }

    /// Any -> Closed. Leaves the room (with `user_left`) and forgets the
    /// connection. Returns its last state.
    pub async fn close(&self, conn_id: ConnectionId) -> Option<ConnectionState> {
        let mut inner = self.inner.write().await;
        let room_id = inner.connections.get(&conn_id)?.state.room_id;
        inner.detach_from_room(conn_id);
        inner.connections.remove(&conn_id).map(|entry| ConnectionState {
            room_id,
            ..entry.state
        })
    }

    /// Deliver `event` to current members of a room, optionally skipping one.
    /// Returns the number of connections it was handed to.
    pub async fn broadcast_to_room(
        &self,
        room_id: RoomId,
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        self.inner.read().await.fan_out(room_id, &event, exclude)
    }

    pub async fn room_members(&self, room_id: RoomId) -> Vec<ConnectionId> {
        self.inner
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// The lock that orders log access against membership for one room.
    ///
    /// Gates are never removed. Callers look the room up before asking for
    /// its gate and rooms are never deleted, so the map holds at most one
    /// entry per stored room.
    pub fn room_gate(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        let mut gates = self
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        gates.entry(room_id).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) fn gate_count(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
