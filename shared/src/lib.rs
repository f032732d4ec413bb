//! Types shared by the arena server and its clients: identifiers, the wire protocol
//! and the deterministic physics engine.

pub mod ids;
pub mod physics;
pub mod protocol;

pub use ids::{ConnectionId, MatchId, ParticipantId, TournamentId, UserId};
pub use physics::{Direction, GameState, Phase, Slot, TerminationReason};
pub use protocol::{ClientEnvelope, ClientMessage, Reply, ServerMessage};
