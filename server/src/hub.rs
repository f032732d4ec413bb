//! The hub: single owner of all cross-room state.
//!
//! Connections, the matchmaking queue, the room table, tournaments and display
//! names live in one task and are only touched while handling one [`HubEvent`] at
//! a time. Network tasks and room tasks talk to the hub exclusively through its
//! event channel, so no lock guards any of this state. Rooms run in their own
//! tasks and report back with [`HubEvent::RoomFinished`].
//!
//! Slow work (reading match history from the store) is spawned off the hub task
//! and answers the connection directly.

use crate::config::ArenaConfig;
use crate::connections::{ConnectionHandle, ConnectionRegistry};
use crate::directory::UserDirectory;
use crate::error::{ArenaError, Result};
use crate::matchmaking::{Enqueued, MatchmakingQueue};
use crate::room::{MatchOutcome, MatchRoom, RoomCommand, RoomContext, RoomFlavor};
use crate::room_code::RoomCodeAllocator;
use crate::room_registry::RoomRegistry;
use crate::store::PersistenceGateway;
use crate::tournament::{Advancement, RoundPlan, TournamentEngine};
use arena_shared::physics::Slot;
use arena_shared::protocol::TournamentView;
use arena_shared::{
    ClientEnvelope, ClientMessage, ConnectionId, Reply, ServerMessage, TournamentId, UserId,
};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug)]
pub enum HubEvent {
    /// A connection completed `session.hello`.
    Connected {
        handle: ConnectionHandle,
        username: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnected {
        user: UserId,
        connection: ConnectionId,
    },
    /// A parsed frame from an established session.
    Message {
        handle: ConnectionHandle,
        envelope: ClientEnvelope,
    },
    /// A room persisted and announced its result and has stopped.
    RoomFinished(MatchOutcome),
    Shutdown,
}

/// Cloneable entry point into a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Registers a connection. Fails when the hub is gone or the server is full.
    pub async fn connect(&self, handle: ConnectionHandle, username: String) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(HubEvent::Connected {
                handle,
                username,
                reply,
            })
            .await
            .map_err(|_| ArenaError::ServerFull)?;
        response.await.map_err(|_| ArenaError::ServerFull)?
    }

    pub async fn disconnect(&self, user: UserId, connection: ConnectionId) {
        let _ = self
            .events
            .send(HubEvent::Disconnected { user, connection })
            .await;
    }

    pub async fn dispatch(&self, handle: ConnectionHandle, envelope: ClientEnvelope) -> bool {
        self.events
            .send(HubEvent::Message { handle, envelope })
            .await
            .is_ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.events.send(HubEvent::Shutdown).await;
    }

    pub fn sender(&self) -> mpsc::Sender<HubEvent> {
        self.events.clone()
    }
}

pub struct Hub {
    config: ArenaConfig,
    store: Arc<dyn PersistenceGateway>,
    directory: Box<dyn UserDirectory>,
    connections: ConnectionRegistry,
    queue: MatchmakingQueue,
    rooms: RoomRegistry,
    tournaments: TournamentEngine,
    rng: StdRng,
    events_tx: mpsc::Sender<HubEvent>,
    events_rx: mpsc::Receiver<HubEvent>,
}

impl Hub {
    pub fn new(
        config: ArenaConfig,
        store: Arc<dyn PersistenceGateway>,
        directory: Box<dyn UserDirectory>,
    ) -> Self {
        Self::with_rng(config, store, directory, StdRng::from_entropy())
    }

    /// A hub whose room codes, bracket shuffles and ball serves all derive from `seed`.
    pub fn with_seed(
        config: ArenaConfig,
        store: Arc<dyn PersistenceGateway>,
        directory: Box<dyn UserDirectory>,
        seed: u64,
    ) -> Self {
        Self::with_rng(config, store, directory, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: ArenaConfig,
        store: Arc<dyn PersistenceGateway>,
        directory: Box<dyn UserDirectory>,
        mut rng: StdRng,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let codes = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(rng.gen()));
        let tournaments = TournamentEngine::with_rng(StdRng::seed_from_u64(rng.gen()));

        Self {
            connections: ConnectionRegistry::new(config.max_connections),
            queue: MatchmakingQueue::new(),
            rooms: RoomRegistry::new(codes),
            tournaments,
            config,
            store,
            directory,
            rng,
            events_tx,
            events_rx,
        }
    }

    pub fn handle(&self) -> HubHandle {
        HubHandle {
            events: self.events_tx.clone(),
        }
    }

    /// Runs the hub on its own task.
    pub fn spawn(self) -> (HubHandle, JoinHandle<()>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    pub async fn run(mut self) {
        info!("Hub started");
        while let Some(event) = self.events_rx.recv().await {
            match event {
                HubEvent::Connected {
                    handle,
                    username,
                    reply,
                } => {
                    let result = self.on_connected(handle, &username);
                    let _ = reply.send(result);
                }
                HubEvent::Disconnected { user, connection } => {
                    self.on_disconnected(user, connection);
                }
                HubEvent::Message { handle, envelope } => self.on_message(handle, envelope),
                HubEvent::RoomFinished(outcome) => self.on_room_finished(outcome),
                HubEvent::Shutdown => break,
            }
        }

        info!("Hub stopping, closing {} rooms", self.rooms.len());
        self.rooms.shutdown_all();
    }

    fn on_connected(&mut self, handle: ConnectionHandle, username: &str) -> Result<()> {
        self.directory.remember(handle.user(), username);
        self.connections.attach(handle.clone())?;
        debug!(
            "{} of {} connections in use, {} users online",
            self.connections.len(),
            self.connections.max_connections(),
            self.connections.online_users()
        );
        handle.send(ServerMessage::Welcome {
            connection_id: handle.id(),
            user_id: handle.user(),
        });
        Ok(())
    }

    fn on_disconnected(&mut self, user: UserId, connection: ConnectionId) {
        self.connections.detach(user, connection);
        if self.queue.remove_connection(connection) {
            debug!("Connection {} left the queue by disconnecting", connection);
        }
        for code in self.rooms.rooms_of(user) {
            if let Err(e) = self
                .rooms
                .send(&code, RoomCommand::ParticipantDisconnected { connection })
            {
                debug!("Room {} did not take the disconnect: {}", code, e);
            }
        }
    }

    fn on_message(&mut self, handle: ConnectionHandle, envelope: ClientEnvelope) {
        let ClientEnvelope { ack, message } = envelope;
        debug!("User {} sent {}", handle.user(), message.name());

        let result = match message {
            ClientMessage::Hello { .. } => Err(ArenaError::invalid_payload(
                "session.hello is only valid as the first frame",
            )),
            ClientMessage::EnterQueue => self.enter_queue(&handle),
            ClientMessage::LeaveQueue => {
                self.queue.remove_connection(handle.id());
                Ok(Reply::success())
            }
            ClientMessage::JoinMatch { room_code } => {
                let command = RoomCommand::Attach {
                    handle: handle.clone(),
                    ack,
                };
                match self.rooms.send(&room_code, command) {
                    Ok(()) => return,
                    Err(e) => Err(e),
                }
            }
            ClientMessage::Input {
                room_code,
                slot,
                direction,
            } => {
                let command = RoomCommand::Input {
                    connection: handle.id(),
                    user: handle.user(),
                    slot,
                    direction,
                };
                match self.rooms.send(&room_code, command) {
                    Ok(()) => return,
                    Err(e) => Err(e),
                }
            }
            ClientMessage::LeaveMatch { room_code } => {
                let command = RoomCommand::Leave {
                    handle: handle.clone(),
                    ack,
                };
                match self.rooms.send(&room_code, command) {
                    Ok(()) => return,
                    Err(e) => Err(e),
                }
            }
            ClientMessage::ListTournaments => {
                Ok(Reply::success().with_tournaments(self.tournaments.list()))
            }
            ClientMessage::CreateTournament {
                name,
                max_participants,
            } => self.create_tournament(&handle, &name, max_participants),
            ClientMessage::JoinTournament { id } => self.join_tournament(&handle, id),
            ClientMessage::StartTournament { id } => self.start_tournament(&handle, id),
            ClientMessage::FetchStats => {
                self.fetch_stats(handle, ack);
                return;
            }
            ClientMessage::FetchHistory { page, limit } => {
                self.fetch_history(handle, ack, page, limit);
                return;
            }
            ClientMessage::Ping => {
                handle.send(ServerMessage::Pong);
                Ok(Reply::success())
            }
        };

        handle.acknowledge(ack, result);
    }

    fn enter_queue(&mut self, handle: &ConnectionHandle) -> Result<Reply> {
        if self.rooms.in_casual_match(handle.user()) {
            return Err(ArenaError::not_joinable("queue while playing a match"));
        }

        match self.queue.enqueue(handle.clone()) {
            Enqueued::Waiting => {
                handle.send(ServerMessage::QueueWaiting);
            }
            Enqueued::AlreadyQueued => {}
            Enqueued::Paired(first, second) => {
                if let Err(e) = self.start_casual(first.clone(), second) {
                    error!("Could not create a casual room: {}", e);
                    self.queue.requeue_front(first);
                    return Err(e);
                }
            }
        }
        Ok(Reply::success())
    }

    /// Creates a casual room with both players attached and its countdown running.
    fn start_casual(&mut self, first: ConnectionHandle, second: ConnectionHandle) -> Result<()> {
        let code = self.rooms.allocate_code()?;
        let participants = [first.user(), second.user()];
        let usernames = [
            self.directory.name_or_placeholder(participants[0], Slot::Left),
            self.directory.name_or_placeholder(participants[1], Slot::Right),
        ];

        let mut room = MatchRoom::new(
            code.clone(),
            RoomFlavor::Casual,
            participants,
            usernames.clone(),
            self.config.countdown(RoomFlavor::Casual),
            self.config.score_limit,
            StdRng::seed_from_u64(self.rng.gen()),
        );

        for handle in [first, second] {
            let joined = room.attach(handle.clone())?;
            handle.send(ServerMessage::Paired {
                room_code: code.clone(),
                participants,
                usernames: usernames.clone(),
                slot: joined.slot,
                state: joined.state,
            });
        }
        room.start_if_ready();

        info!("Casual room {}: {} vs {}", code, usernames[0], usernames[1]);
        let ctx = self.room_context();
        self.rooms.spawn(room, ctx);
        Ok(())
    }

    fn create_tournament(
        &mut self,
        handle: &ConnectionHandle,
        name: &str,
        max_participants: u32,
    ) -> Result<Reply> {
        let username = self
            .directory
            .name_or_placeholder(handle.user(), Slot::Left);
        let view = self
            .tournaments
            .create(name, max_participants, handle.user(), &username)?;

        self.connections
            .broadcast(&ServerMessage::TournamentCreated(view.clone()));
        Ok(Reply::success().with_tournament(view))
    }

    fn join_tournament(&mut self, handle: &ConnectionHandle, id: TournamentId) -> Result<Reply> {
        let username = self
            .directory
            .name_or_placeholder(handle.user(), Slot::Left);
        let outcome = self.tournaments.join(id, handle.user(), &username)?;
        let view = outcome.tournament;

        self.connections
            .broadcast(&ServerMessage::TournamentUpdated(view.clone()));
        if outcome.full {
            let notice = ServerMessage::RoomFull {
                tournament_id: view.id,
                tournament_name: view.name.clone(),
                message: format!("{} is full and ready to start", view.name),
            };
            for participant in &view.participants {
                self.connections.send_to_user(participant.user_id, &notice);
            }
        }
        Ok(Reply::success().with_tournament(view))
    }

    fn start_tournament(&mut self, handle: &ConnectionHandle, id: TournamentId) -> Result<Reply> {
        let plan = self.tournaments.plan_start(id, handle.user())?;
        self.launch_round(&plan)?;

        let view = self.tournaments.view(id)?;
        info!("Tournament {} '{}' started", view.id, view.name);
        self.connections
            .broadcast(&ServerMessage::TournamentStarted(view.clone()));
        Ok(Reply::success().with_tournament(view))
    }

    /// Reserves the rooms of a round, records it, then opens the rooms.
    fn launch_round(&mut self, plan: &RoundPlan) -> Result<()> {
        let codes = self.rooms.reserve_codes(plan.rooms_needed())?;
        let assignments = match self.tournaments.commit_round(plan, codes.clone()) {
            Ok(assignments) => assignments,
            Err(e) => {
                self.rooms.release_codes(&codes);
                return Err(e);
            }
        };

        for assignment in assignments {
            let room = MatchRoom::new(
                assignment.room_code.clone(),
                RoomFlavor::Tournament,
                assignment.users,
                assignment.usernames.clone(),
                self.config.countdown(RoomFlavor::Tournament),
                self.config.score_limit,
                StdRng::seed_from_u64(self.rng.gen()),
            )
            .with_binding(assignment.binding());
            let ctx = self.room_context();
            self.rooms.spawn(room, ctx);

            let notice = ServerMessage::Assigned {
                tournament_id: assignment.tournament_id,
                match_id: assignment.match_id,
                round: assignment.round,
                room_code: assignment.room_code.clone(),
                players: assignment.usernames.clone(),
            };
            for user in assignment.users {
                if self.connections.send_to_user(user, &notice) == 0 {
                    warn!(
                        "User {} is offline for match {} in room {}",
                        user, assignment.match_id, assignment.room_code
                    );
                }
            }
        }
        Ok(())
    }

    fn on_room_finished(&mut self, outcome: MatchOutcome) {
        self.rooms.remove(&outcome.room_code);

        let Some(binding) = outcome.binding.clone() else {
            return;
        };
        let Some(winner) = outcome.winning_participant() else {
            return;
        };

        match self
            .tournaments
            .record_result(binding.match_id, outcome.scores, winner)
        {
            Ok(Advancement::Pending) | Ok(Advancement::Finished { .. }) => {}
            Ok(Advancement::NextRound(plan)) => {
                if let Err(e) = self.launch_round(&plan) {
                    error!(
                        "Tournament {}: could not start round {}: {}",
                        plan.tournament_id, plan.round, e
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Tournament {}: result of match {} ignored: {}",
                    binding.tournament_id, binding.match_id, e
                );
                return;
            }
        }

        if let Ok(view) = self.tournaments.view(binding.tournament_id) {
            self.broadcast_update(view);
        }
    }

    fn broadcast_update(&self, view: TournamentView) {
        self.connections
            .broadcast(&ServerMessage::TournamentUpdated(view));
    }

    fn fetch_stats(&self, handle: ConnectionHandle, ack: Option<u64>) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let result = store
                .fetch_stats(handle.user())
                .await
                .map(|stats| Reply::success().with_stats(stats))
                .map_err(ArenaError::from);
            handle.acknowledge(ack, result);
        });
    }

    fn fetch_history(&self, handle: ConnectionHandle, ack: Option<u64>, page: u32, limit: u32) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let result = store
                .fetch_match_history(handle.user(), page, limit)
                .await
                .map(|history| Reply::success().with_history(history))
                .map_err(ArenaError::from);
            handle.acknowledge(ack, result);
        });
    }

    fn room_context(&self) -> RoomContext {
        RoomContext {
            store: self.store.clone(),
            events: self.events_tx.clone(),
            tick_interval: self.config.tick_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn hub() -> (HubHandle, JoinHandle<()>) {
        let config = ArenaConfig {
            casual_countdown: 0,
            tournament_countdown: 0,
            ..ArenaConfig::default()
        };
        Hub::with_seed(
            config,
            Arc::new(MemoryStore::new()),
            Box::new(MemoryDirectory::new()),
            7,
        )
        .spawn()
    }

    async fn connect(
        hub: &HubHandle,
        id: u64,
        user: u64,
    ) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        let (handle, rx) = ConnectionHandle::channel(ConnectionId(id), UserId(user), 1024);
        hub.connect(handle.clone(), format!("user{}", user))
            .await
            .unwrap();
        (handle, rx)
    }

    async fn next(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_sends_welcome() {
        let (hub, _task) = hub();
        let (_handle, mut rx) = connect(&hub, 1, 10).await;

        assert_eq!(
            next(&mut rx).await,
            ServerMessage::Welcome {
                connection_id: ConnectionId(1),
                user_id: UserId(10),
            }
        );
    }

    #[tokio::test]
    async fn test_ping_pong_with_ack() {
        let (hub, _task) = hub();
        let (handle, mut rx) = connect(&hub, 1, 10).await;
        next(&mut rx).await;

        hub.dispatch(handle, ClientEnvelope::with_ack(4, ClientMessage::Ping))
            .await;
        assert_eq!(next(&mut rx).await, ServerMessage::Pong);
        assert_eq!(next(&mut rx).await, ServerMessage::Ack(Reply::ok(4)));
    }

    #[tokio::test]
    async fn test_second_hello_is_rejected() {
        let (hub, _task) = hub();
        let (handle, mut rx) = connect(&hub, 1, 10).await;
        next(&mut rx).await;

        hub.dispatch(
            handle,
            ClientEnvelope::new(ClientMessage::Hello {
                user_id: UserId(10),
                username: "again".to_string(),
            }),
        )
        .await;
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, "INVALID_PAYLOAD"),
            other => panic!("expected an error frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_room_code_is_reported() {
        let (hub, _task) = hub();
        let (handle, mut rx) = connect(&hub, 1, 10).await;
        next(&mut rx).await;

        hub.dispatch(
            handle,
            ClientEnvelope::with_ack(
                1,
                ClientMessage::JoinMatch {
                    room_code: "ZZZZZZ".to_string(),
                },
            ),
        )
        .await;
        match next(&mut rx).await {
            ServerMessage::Ack(reply) => {
                assert!(!reply.success);
                assert_eq!(reply.code.as_deref(), Some("ROOM_NOT_FOUND"));
            }
            other => panic!("expected an ack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_full_is_reported_to_connect() {
        let config = ArenaConfig {
            max_connections: 1,
            ..ArenaConfig::default()
        };
        let (hub, _task) = Hub::new(
            config,
            Arc::new(MemoryStore::new()),
            Box::new(MemoryDirectory::new()),
        )
        .spawn();

        let (_first, _rx) = connect(&hub, 1, 10).await;
        let (second, _rx2) = ConnectionHandle::channel(ConnectionId(2), UserId(11), 8);
        assert_eq!(
            hub.connect(second, "late".to_string()).await.unwrap_err(),
            ArenaError::ServerFull
        );
    }
}
