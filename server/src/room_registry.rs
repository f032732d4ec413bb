//! Table of live match rooms, keyed by room code.
//!
//! Every room runs in its own task; the registry keeps the sending half of its
//! command channel and the code it was allocated. Codes are reserved here first
//! and released when the room is removed.

use crate::error::{ArenaError, Result};
use crate::room::{run_room, MatchRoom, RoomCommand, RoomContext};
use crate::room_code::RoomCodeAllocator;
use arena_shared::{MatchId, TournamentId, UserId};
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 64;

/// Who created a room and gets told when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomOwner {
    Matchmaking,
    Tournament {
        tournament_id: TournamentId,
        match_id: MatchId,
    },
}

struct RoomEntry {
    participants: [UserId; 2],
    owner: RoomOwner,
    commands: mpsc::Sender<RoomCommand>,
    task: JoinHandle<()>,
}

pub struct RoomRegistry {
    codes: RoomCodeAllocator,
    rooms: HashMap<String, RoomEntry>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RoomCodeAllocator::new())
    }
}

impl RoomRegistry {
    pub fn new(codes: RoomCodeAllocator) -> Self {
        Self {
            codes,
            rooms: HashMap::new(),
        }
    }

    pub fn allocate_code(&mut self) -> Result<String> {
        self.codes.allocate()
    }

    /// Reserves one code per room of a tournament round, all or none.
    pub fn reserve_codes(&mut self, count: usize) -> Result<Vec<String>> {
        self.codes.allocate_many(count)
    }

    /// Gives back codes that never got a room.
    pub fn release_codes(&mut self, codes: &[String]) {
        for code in codes {
            if !self.rooms.contains_key(code) {
                self.codes.release(code);
            }
        }
    }

    /// Starts the room's task. The room's code must have been reserved through this registry.
    pub fn spawn(&mut self, room: MatchRoom, ctx: RoomContext) {
        let code = room.code().to_string();
        let participants = room.participants();
        let owner = match room.binding() {
            Some(binding) => RoomOwner::Tournament {
                tournament_id: binding.tournament_id,
                match_id: binding.match_id,
            },
            None => RoomOwner::Matchmaking,
        };

        let (commands, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run_room(room, commands_rx, ctx));
        info!(
            "Room {} created for users {} and {} ({:?})",
            code, participants[0], participants[1], owner
        );

        let previous = self.rooms.insert(
            code.clone(),
            RoomEntry {
                participants,
                owner,
                commands,
                task,
            },
        );
        if let Some(previous) = previous {
            warn!("Room code {} was still in use, stopping the old room", code);
            previous.task.abort();
        }
    }

    /// Forwards a command without waiting on the room.
    pub fn send(&self, code: &str, command: RoomCommand) -> Result<()> {
        let entry = self
            .rooms
            .get(code)
            .ok_or_else(|| ArenaError::room_not_found(code))?;
        deliver(code, &entry.commands, command)
    }

    /// Drops a room and releases its code. The room's task is expected to have ended.
    pub fn remove(&mut self, code: &str) -> Option<RoomOwner> {
        let entry = self.rooms.remove(code)?;
        self.codes.release(code);
        debug!("Room {} removed, {} rooms left", code, self.rooms.len());
        Some(entry.owner)
    }

    /// Codes of every live room the user plays in.
    pub fn rooms_of(&self, user: UserId) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|(_, entry)| entry.participants.contains(&user))
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// Whether the user has a casual room that is still being played.
    pub fn in_casual_match(&self, user: UserId) -> bool {
        self.rooms.values().any(|entry| {
            entry.owner == RoomOwner::Matchmaking
                && entry.participants.contains(&user)
                && !entry.task.is_finished()
        })
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Asks every room to stop and forgets them.
    pub fn shutdown_all(&mut self) {
        for (code, entry) in self.rooms.drain() {
            if entry.commands.try_send(RoomCommand::Shutdown).is_err() {
                entry.task.abort();
            }
            self.codes.release(&code);
        }
    }
}

/// Queues a command for a room. Inputs and joins are refused while the queue is full;
/// lifecycle commands wait for space in a task of their own so they still arrive in order.
fn deliver(code: &str, commands: &mpsc::Sender<RoomCommand>, command: RoomCommand) -> Result<()> {
    match commands.try_send(command) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(command)) if command.is_lifecycle() => {
            warn!("Room {} command queue is full, delivering a lifecycle command late", code);
            let commands = commands.clone();
            tokio::spawn(async move {
                // a closed channel means the room is already gone
                let _ = commands.send(command).await;
            });
            Ok(())
        }
        Err(TrySendError::Full(_)) => {
            warn!("Room {} command queue is full", code);
            Err(ArenaError::not_joinable(format!("room {}", code)))
        }
        Err(TrySendError::Closed(_)) => Err(ArenaError::room_not_found(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubEvent;
    use crate::room::{RoomFlavor, TournamentBinding};
    use crate::store::MemoryStore;
    use arena_shared::physics::{Direction, SCORE_LIMIT};
    use arena_shared::{ConnectionId, ParticipantId, Slot};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::time::Duration;

    fn context() -> (RoomContext, mpsc::Receiver<HubEvent>) {
        let (events, events_rx) = mpsc::channel(8);
        let ctx = RoomContext {
            store: Arc::new(MemoryStore::new()),
            events,
            tick_interval: Duration::from_millis(10),
        };
        (ctx, events_rx)
    }

    fn room(code: String, users: [u64; 2]) -> MatchRoom {
        MatchRoom::new(
            code,
            RoomFlavor::Tournament,
            [UserId(users[0]), UserId(users[1])],
            ["a".to_string(), "b".to_string()],
            3,
            SCORE_LIMIT,
            StdRng::seed_from_u64(3),
        )
    }

    fn registry() -> RoomRegistry {
        RoomRegistry::new(RoomCodeAllocator::with_rng(StdRng::seed_from_u64(5)))
    }

    #[tokio::test]
    async fn test_spawn_send_and_remove() {
        let mut registry = registry();
        let (ctx, _events) = context();
        let code = registry.allocate_code().unwrap();

        registry.spawn(room(code.clone(), [1, 2]), ctx);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.rooms_of(UserId(2)), vec![code.clone()]);
        assert!(registry.rooms_of(UserId(3)).is_empty());

        registry.send(&code, RoomCommand::Shutdown).unwrap();
        assert_eq!(registry.remove(&code), Some(RoomOwner::Matchmaking));
        assert!(registry.is_empty());
        assert!(registry.remove(&code).is_none());
    }

    #[tokio::test]
    async fn test_unknown_room_is_reported() {
        let registry = registry();
        assert_eq!(
            registry.send("NOPE42", RoomCommand::Shutdown).unwrap_err(),
            ArenaError::room_not_found("NOPE42")
        );
    }

    #[tokio::test]
    async fn test_tournament_rooms_remember_their_match() {
        let mut registry = registry();
        let (ctx, _events) = context();
        let code = registry.allocate_code().unwrap();
        let bound = room(code.clone(), [1, 2]).with_binding(TournamentBinding {
            tournament_id: TournamentId(2),
            match_id: MatchId(9),
            participants: [ParticipantId(1), ParticipantId(2)],
            has_next_match: false,
        });

        registry.spawn(bound, ctx);
        registry.send(&code, RoomCommand::Shutdown).unwrap();
        assert_eq!(
            registry.remove(&code),
            Some(RoomOwner::Tournament {
                tournament_id: TournamentId(2),
                match_id: MatchId(9),
            })
        );
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_refuses_input_but_keeps_disconnects() {
        let (commands, mut commands_rx) = mpsc::channel(1);
        let input = || RoomCommand::Input {
            connection: ConnectionId(10),
            user: UserId(1),
            slot: Slot::Left,
            direction: Direction::Up,
        };

        deliver("ROOM01", &commands, input()).unwrap();
        assert_eq!(
            deliver("ROOM01", &commands, input()).unwrap_err().code(),
            "NOT_JOINABLE"
        );
        deliver(
            "ROOM01",
            &commands,
            RoomCommand::ParticipantDisconnected {
                connection: ConnectionId(10),
            },
        )
        .unwrap();

        assert!(matches!(commands_rx.recv().await, Some(RoomCommand::Input { .. })));
        assert!(matches!(
            commands_rx.recv().await,
            Some(RoomCommand::ParticipantDisconnected {
                connection: ConnectionId(10)
            })
        ));

        drop(commands_rx);
        assert_eq!(
            deliver("ROOM01", &commands, RoomCommand::Shutdown).unwrap_err(),
            ArenaError::room_not_found("ROOM01")
        );
    }

    #[test]
    fn test_unused_codes_are_released() {
        let mut registry = registry();
        let codes = registry.reserve_codes(3).unwrap();
        assert_eq!(codes.len(), 3);

        assert_eq!(registry.codes.len(), 3);

        registry.release_codes(&codes);
        assert!(registry.codes.is_empty());
    }
}
