//! First come, first served matchmaking for casual games.

use crate::connections::ConnectionHandle;
use arena_shared::{ConnectionId, UserId};
use log::{debug, info};
use std::collections::VecDeque;

/// Result of [`MatchmakingQueue::enqueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// Parked until somebody else shows up.
    Waiting,
    /// The user already has a connection in the queue; nothing changed.
    AlreadyQueued,
    /// Two players to seat, in queue order: the one who waited comes first.
    Paired(ConnectionHandle, ConnectionHandle),
}

#[derive(Default)]
pub struct MatchmakingQueue {
    waiting: VecDeque<ConnectionHandle>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs the connection with the oldest waiting one, or parks it.
    ///
    /// A user is never paired with themselves, even from a second connection.
    /// Waiting entries whose connection has closed are discarded on the way.
    pub fn enqueue(&mut self, handle: ConnectionHandle) -> Enqueued {
        if self.contains_user(handle.user()) {
            debug!("User {} is already queued", handle.user());
            return Enqueued::AlreadyQueued;
        }

        while let Some(waiting) = self.waiting.pop_front() {
            if waiting.is_closed() {
                debug!("Dropping stale queue entry {}", waiting.id());
                continue;
            }
            info!("Paired users {} and {}", waiting.user(), handle.user());
            return Enqueued::Paired(waiting, handle);
        }

        info!("User {} is waiting for an opponent", handle.user());
        self.waiting.push_back(handle);
        Enqueued::Waiting
    }

    /// Puts a connection back at the head of the queue, e.g. after a failed room creation.
    pub fn requeue_front(&mut self, handle: ConnectionHandle) {
        if !self.contains_user(handle.user()) {
            self.waiting.push_front(handle);
        }
    }

    pub fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|handle| handle.id() != connection);
        self.waiting.len() < before
    }

    pub fn contains_user(&self, user: UserId) -> bool {
        self.waiting.iter().any(|handle| handle.user() == user)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
