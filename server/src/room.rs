//! Match rooms.
//!
//! A [`MatchRoom`] binds one [`GameState`] to the two users playing it and to at most
//! one live connection per slot. The room itself is plain synchronous state; the
//! [`run_room`] driver owns it inside a dedicated task, feeds it commands, runs the
//! countdown and the tick loop, and performs the finish sequence exactly once:
//! persist, announce, then report [`HubEvent::RoomFinished`].

use crate::connections::ConnectionHandle;
use crate::error::{ArenaError, Result};
use crate::hub::HubEvent;
use crate::store::PersistenceGateway;
use arena_shared::physics::{self, Direction, GameState, Phase, Slot, TerminationReason};
use arena_shared::protocol::{MatchJoined, MatchResult};
use arena_shared::{
    ConnectionId, MatchId, ParticipantId, Reply, ServerMessage, TournamentId, UserId,
};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomFlavor {
    /// Paired by the matchmaking queue; both players are attached at creation.
    Casual,
    /// Serves a bracket match; players attach with `match.join`.
    Tournament,
}

/// Link between a room and the bracket match it decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentBinding {
    pub tournament_id: TournamentId,
    pub match_id: MatchId,
    pub participants: [ParticipantId; 2],
    /// Whether the winner of this match plays again.
    pub has_next_match: bool,
}

/// Final result of a room, handed to the hub once persisted and announced.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub room_code: String,
    pub participants: [UserId; 2],
    pub usernames: [String; 2],
    pub scores: [u32; 2],
    pub winner_slot: Slot,
    pub reason: TerminationReason,
    pub binding: Option<TournamentBinding>,
}

impl MatchOutcome {
    pub fn winner(&self) -> UserId {
        self.participants[self.winner_slot.index()]
    }

    pub fn loser(&self) -> UserId {
        self.participants[self.winner_slot.opponent().index()]
    }

    pub fn winning_participant(&self) -> Option<ParticipantId> {
        self.binding
            .as_ref()
            .map(|binding| binding.participants[self.winner_slot.index()])
    }
}

#[derive(Debug)]
pub enum RoomCommand {
    Attach {
        handle: ConnectionHandle,
        ack: Option<u64>,
    },
    Input {
        connection: ConnectionId,
        user: UserId,
        slot: Slot,
        direction: Direction,
    },
    Leave {
        handle: ConnectionHandle,
        ack: Option<u64>,
    },
    ParticipantDisconnected {
        connection: ConnectionId,
    },
    Shutdown,
}

impl RoomCommand {
    /// Commands that end a seat or the room. These are never dropped on a full queue.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            RoomCommand::Leave { .. }
                | RoomCommand::ParticipantDisconnected { .. }
                | RoomCommand::Shutdown
        )
    }
}

pub struct MatchRoom {
    code: String,
    flavor: RoomFlavor,
    participants: [UserId; 2],
    usernames: [String; 2],
    connections: [Option<ConnectionHandle>; 2],
    state: GameState,
    binding: Option<TournamentBinding>,
    countdown: u32,
    countdown_remaining: u32,
    score_limit: u32,
    rng: StdRng,
    outcome: Option<MatchOutcome>,
    announced: bool,
}

impl MatchRoom {
    pub fn new(
        code: String,
        flavor: RoomFlavor,
        participants: [UserId; 2],
        usernames: [String; 2],
        countdown: u32,
        score_limit: u32,
        rng: StdRng,
    ) -> Self {
        Self {
            code,
            flavor,
            participants,
            usernames,
            connections: [None, None],
            state: GameState::new(),
            binding: None,
            countdown,
            countdown_remaining: countdown,
            score_limit,
            rng,
            outcome: None,
            announced: false,
        }
    }

    pub fn with_binding(mut self, binding: TournamentBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn flavor(&self) -> RoomFlavor {
        self.flavor
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn participants(&self) -> [UserId; 2] {
        self.participants
    }

    pub fn usernames(&self) -> &[String; 2] {
        &self.usernames
    }

    pub fn binding(&self) -> Option<&TournamentBinding> {
        self.binding.as_ref()
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn is_attached(&self, slot: Slot) -> bool {
        self.connections[slot.index()].is_some()
    }

    pub fn slot_of(&self, user: UserId) -> Option<Slot> {
        Slot::BOTH
            .into_iter()
            .find(|slot| self.participants[slot.index()] == user)
    }

    /// Applies one command. Returns false when the room should stop.
    pub fn handle(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Attach { handle, ack } => match self.attach(handle.clone()) {
                Ok(joined) => {
                    handle.acknowledge(ack, Ok(Reply::success().with_joined(joined)));
                    if self.flavor == RoomFlavor::Tournament {
                        self.announce_joined();
                    }
                    self.start_if_ready();
                }
                Err(e) => handle.acknowledge(ack, Err(e)),
            },
            RoomCommand::Input {
                connection,
                user,
                slot,
                direction,
            } => {
                if let Err(e) = self.input(connection, user, slot, direction) {
                    debug!("Room {}: rejected input: {}", self.code, e);
                }
            }
            RoomCommand::Leave { handle, ack } => {
                let result = self.leave(handle.user()).map(|_| Reply::success());
                handle.acknowledge(ack, result);
            }
            RoomCommand::ParticipantDisconnected { connection } => {
                self.participant_disconnected(connection);
            }
            RoomCommand::Shutdown => return false,
        }
        true
    }

    /// Seats a connection in its user's slot, replacing any previous connection there.
    pub fn attach(&mut self, handle: ConnectionHandle) -> Result<MatchJoined> {
        if self.state.phase == Phase::Finished {
            return Err(ArenaError::not_joinable(format!("room {}", self.code)));
        }
        let slot = self
            .slot_of(handle.user())
            .ok_or(ArenaError::NotParticipant {
                user: handle.user(),
            })?;

        info!(
            "Room {}: user {} attached to slot {} via connection {}",
            self.code,
            handle.user(),
            slot.index(),
            handle.id()
        );
        self.connections[slot.index()] = Some(handle);

        Ok(MatchJoined {
            room_code: self.code.clone(),
            slot,
            usernames: self.usernames.clone(),
            state: self.state,
        })
    }

    /// Enters the countdown once both slots are attached. Fires at most once.
    pub fn start_if_ready(&mut self) -> bool {
        if self.state.phase != Phase::Waiting || !self.connections.iter().all(Option::is_some) {
            return false;
        }

        self.state.phase = Phase::Countdown;
        self.countdown_remaining = self.countdown;
        info!("Room {}: countdown from {}s", self.code, self.countdown);

        if self.countdown == 0 {
            self.begin();
        } else {
            self.broadcast(ServerMessage::Countdown {
                room_code: self.code.clone(),
                seconds_remaining: self.countdown_remaining,
            });
        }
        true
    }

    /// Advances the countdown by one second.
    pub fn countdown_step(&mut self) {
        if self.state.phase != Phase::Countdown {
            return;
        }

        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining == 0 {
            self.begin();
        } else {
            self.broadcast(ServerMessage::Countdown {
                room_code: self.code.clone(),
                seconds_remaining: self.countdown_remaining,
            });
        }
    }

    fn begin(&mut self) {
        self.state.phase = Phase::Running;
        info!("Room {}: match begins", self.code);
        self.broadcast(ServerMessage::Begin {
            room_code: self.code.clone(),
        });
    }

    /// Records the latest paddle direction of a slot. Only the connection seated in
    /// that slot may steer it, and only while the match is running.
    pub fn input(
        &mut self,
        connection: ConnectionId,
        user: UserId,
        slot: Slot,
        direction: Direction,
    ) -> Result<()> {
        match &self.connections[slot.index()] {
            Some(handle) if handle.id() == connection => {}
            _ => return Err(ArenaError::NotParticipant { user }),
        }
        if self.state.phase == Phase::Running {
            self.state.set_direction(slot, direction);
        }
        Ok(())
    }

    /// Runs one simulation step and broadcasts the result.
    pub fn tick(&mut self, dt: f32) {
        if self.state.phase != Phase::Running {
            return;
        }

        let outcome = physics::step(&mut self.state, dt, self.score_limit, &mut self.rng);
        if let Some(scorer) = outcome.goal {
            debug!(
                "Room {}: slot {} scored ({}-{})",
                self.code,
                scorer.index(),
                self.state.scores[0],
                self.state.scores[1]
            );
        }
        if let Some(winner) = outcome.winner {
            self.conclude(winner, TerminationReason::ScoreLimit);
        }

        self.broadcast(ServerMessage::Tick {
            room_code: self.code.clone(),
            state: self.state,
        });
    }

    /// Handles a lost connection. A seated participant dropping out of an unfinished
    /// room forfeits on the spot, even before the match has started.
    pub fn participant_disconnected(&mut self, connection: ConnectionId) -> bool {
        let seated = Slot::BOTH.into_iter().find(|slot| {
            self.connections[slot.index()]
                .as_ref()
                .is_some_and(|handle| handle.id() == connection)
        });
        let Some(slot) = seated else {
            return false;
        };
        self.connections[slot.index()] = None;

        if self.state.phase == Phase::Finished {
            return false;
        }
        if self.state.phase == Phase::Waiting {
            info!("Room {}: slot {} dropped before the start", self.code, slot.index());
        }

        self.broadcast(ServerMessage::PlayerLeft {
            room_code: self.code.clone(),
            slot,
        });
        self.conclude(slot.opponent(), TerminationReason::Disconnect)
    }

    /// Explicit concession by a participant.
    pub fn leave(&mut self, user: UserId) -> Result<bool> {
        let slot = self
            .slot_of(user)
            .ok_or(ArenaError::NotParticipant { user })?;
        if self.state.phase == Phase::Finished {
            return Ok(false);
        }

        self.broadcast(ServerMessage::PlayerLeft {
            room_code: self.code.clone(),
            slot,
        });
        Ok(self.conclude(slot.opponent(), TerminationReason::Forfeit))
    }

    /// Moves the room to FINISHED. Only the first call has any effect.
    pub fn conclude(&mut self, winner: Slot, reason: TerminationReason) -> bool {
        if self.state.phase == Phase::Finished {
            debug!("Room {}: already finished, ignoring {:?}", self.code, reason);
            return false;
        }

        self.state.phase = Phase::Finished;
        self.state.winner_slot = Some(winner);
        self.state.termination_reason = Some(reason);
        for paddle in &mut self.state.paddles {
            paddle.direction = Direction::Idle;
        }

        info!(
            "Room {}: {} wins {}-{} ({:?})",
            self.code,
            self.usernames[winner.index()],
            self.state.scores[0],
            self.state.scores[1],
            reason
        );

        self.outcome = Some(MatchOutcome {
            room_code: self.code.clone(),
            participants: self.participants,
            usernames: self.usernames.clone(),
            scores: self.state.scores,
            winner_slot: winner,
            reason,
            binding: self.binding.clone(),
        });
        true
    }

    /// Hands out the outcome of a finished room, once.
    pub fn take_outcome(&mut self) -> Option<MatchOutcome> {
        self.outcome.take()
    }

    /// Sends `match.finished` to every attached connection. Only the first call sends.
    pub fn announce_finish(&mut self) -> bool {
        let Some(winner) = self.state.winner_slot else {
            return false;
        };
        if self.announced {
            return false;
        }
        self.announced = true;

        let has_next_match = self
            .binding
            .as_ref()
            .is_some_and(|binding| binding.has_next_match);

        for slot in Slot::BOTH {
            if let Some(handle) = &self.connections[slot.index()] {
                handle.send(ServerMessage::Finished(MatchResult {
                    room_code: self.code.clone(),
                    winner_slot: Some(winner),
                    winner_name: Some(self.usernames[winner.index()].clone()),
                    usernames: self.usernames.clone(),
                    scores: self.state.scores,
                    reason: self
                        .state
                        .termination_reason
                        .unwrap_or(TerminationReason::ScoreLimit),
                    has_next_match: has_next_match && slot == winner,
                }));
            }
        }
        true
    }

    fn announce_joined(&self) {
        self.broadcast(ServerMessage::PlayerJoined {
            room_code: self.code.clone(),
            usernames: self.usernames.clone(),
            joined: [self.is_attached(Slot::Left), self.is_attached(Slot::Right)],
        });
    }

    fn broadcast(&self, message: ServerMessage) {
        for handle in self.connections.iter().flatten() {
            handle.send(message.clone());
        }
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }
}

/// Collaborators a room task needs besides its commands.
#[derive(Clone)]
pub struct RoomContext {
    pub store: Arc<dyn PersistenceGateway>,
    pub events: mpsc::Sender<HubEvent>,
    pub tick_interval: Duration,
}

/// Drives one room until it finishes or is shut down.
pub async fn run_room(
    mut room: MatchRoom,
    mut commands: mpsc::Receiver<RoomCommand>,
    ctx: RoomContext,
) {
    let mut ticker = interval(ctx.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_update = Instant::now();
    let mut countdown_deadline = match room.phase() {
        Phase::Countdown => Some(Instant::now() + COUNTDOWN_STEP),
        _ => None,
    };

    loop {
        let running = room.phase() == Phase::Running;

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Room {}: command channel closed", room.code());
                    return;
                };
                if !room.handle(command) {
                    info!("Room {}: shut down", room.code());
                    return;
                }
            }
            _ = sleep_until(countdown_deadline.unwrap_or_else(Instant::now)), if countdown_deadline.is_some() => {
                room.countdown_step();
                countdown_deadline = countdown_deadline.map(|deadline| deadline + COUNTDOWN_STEP);
            }
            _ = ticker.tick(), if running => {
                let now = Instant::now();
                let delta_time = (now - last_update).as_secs_f32();
                last_update = now;

                if delta_time > physics::MAX_DELTA_TIME {
                    debug!(
                        "Room {}: large delta time ({:.3}s), capping to {:.3}s",
                        room.code(),
                        delta_time,
                        physics::MAX_DELTA_TIME
                    );
                }
                room.tick(delta_time);
            }
        }

        if !running && room.phase() == Phase::Running {
            last_update = Instant::now();
            ticker.reset();
        }
        countdown_deadline = match room.phase() {
            Phase::Countdown => countdown_deadline.or_else(|| Some(Instant::now() + COUNTDOWN_STEP)),
            _ => None,
        };

        if let Some(outcome) = room.take_outcome() {
            finish(&mut room, outcome, &ctx).await;
            // answer whatever was already queued; the room is finished
            commands.close();
            while let Ok(command) = commands.try_recv() {
                room.handle(command);
            }
            return;
        }
    }
}

/// Persist, announce, report. A failed write is logged and does not hold back the result.
async fn finish(room: &mut MatchRoom, outcome: MatchOutcome, ctx: &RoomContext) {
    let recorded = match &outcome.binding {
        Some(binding) => {
            ctx.store
                .record_tournament_match(
                    binding.match_id,
                    outcome.scores[0],
                    outcome.scores[1],
                    outcome.winning_participant(),
                )
                .await
        }
        None => {
            ctx.store
                .record_casual_game(
                    outcome.participants[0],
                    outcome.participants[1],
                    outcome.scores[0],
                    outcome.scores[1],
                    Some(outcome.winner()),
                )
                .await
        }
    };
    if let Err(e) = recorded {
        error!("Room {}: failed to record result: {}", room.code(), e);
    }

    room.announce_finish();

    if ctx.events.send(HubEvent::RoomFinished(outcome)).await.is_err() {
        warn!("Room {}: hub is gone, result not reported", room.code());
    }
}
