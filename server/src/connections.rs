//! Connection registry: which users are online and how to reach them.
//!
//! A user may hold several connections at once (several tabs, a reconnect racing
//! the old socket). Presence only drops to offline when the last one detaches.
//! Rooms keep their own single handle per slot and do not consult this registry
//! for gameplay.

use crate::error::{ArenaError, Result};
use arena_shared::{ConnectionId, Reply, ServerMessage, UserId};
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Sending half of one live connection.
///
/// Cloning is cheap; all clones feed the same outbound queue. Sends never block:
/// when the queue is full the message is dropped so a slow reader cannot stall
/// the room that is broadcasting to it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user: UserId,
    tx: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, user: UserId, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, user, tx }
    }

    /// Creates a handle together with the receiver its messages arrive on.
    pub fn channel(
        id: ConnectionId,
        user: UserId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(id, user, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queues a message. Returns false when it was dropped.
    pub fn send(&self, message: ServerMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue of connection {} is full, dropping message", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Connection {} is closed, dropping message", self.id);
                false
            }
        }
    }

    /// Answers a request.
    ///
    /// With an ack number the result becomes an `ack` frame; without one only
    /// failures are reported, as an `error` frame.
    pub fn acknowledge(&self, ack: Option<u64>, result: Result<Reply>) {
        match (ack, result) {
            (Some(ack), Ok(reply)) => {
                self.send(ServerMessage::Ack(Reply { ack, ..reply }));
            }
            (Some(ack), Err(e)) => {
                self.send(ServerMessage::Ack(Reply::failure(ack, e.code(), e.to_string())));
            }
            (None, Ok(_)) => {}
            (None, Err(e)) => {
                self.send(ServerMessage::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

pub struct ConnectionRegistry {
    /// Live connections per user, oldest first.
    users: HashMap<UserId, Vec<ConnectionHandle>>,
    total: usize,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            users: HashMap::new(),
            total: 0,
            max_connections,
        }
    }

    /// Registers a connection for its user.
    ///
    /// Fails with [`ArenaError::ServerFull`] once `max_connections` are attached.
    /// Attaching the same connection twice is a no-op.
    pub fn attach(&mut self, handle: ConnectionHandle) -> Result<()> {
        let connections = self.users.entry(handle.user()).or_default();
        if connections.contains(&handle) {
            return Ok(());
        }
        if self.total >= self.max_connections {
            if connections.is_empty() {
                self.users.remove(&handle.user());
            }
            return Err(ArenaError::ServerFull);
        }

        info!("User {} attached connection {}", handle.user(), handle.id());
        connections.push(handle);
        self.total += 1;
        Ok(())
    }

    /// Removes one connection. Returns true if it was registered.
    pub fn detach(&mut self, user: UserId, connection: ConnectionId) -> bool {
        let Some(connections) = self.users.get_mut(&user) else {
            return false;
        };
        let before = connections.len();
        connections.retain(|handle| handle.id() != connection);
        let removed = connections.len() < before;

        if removed {
            self.total -= 1;
            info!("User {} detached connection {}", user, connection);
        }
        if connections.is_empty() {
            self.users.remove(&user);
            info!("User {} is offline", user);
        }
        removed
    }

    /// Delivers a message to every connection of a user. Returns the number queued.
    pub fn send_to_user(&self, user: UserId, message: &ServerMessage) -> usize {
        self.users.get(&user).map_or(0, |connections| {
            connections
                .iter()
                .filter(|handle| handle.send(message.clone()))
                .count()
        })
    }

    pub fn broadcast(&self, message: &ServerMessage) {
        for handle in self.users.values().flatten() {
            handle.send(message.clone());
        }
    }

    pub fn online_users(&self) -> usize {
        self.users.len()
    }

    /// Number of attached connections across all users.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}
