//! # Pong Arena Server Library
//!
//! Authoritative server for two-player Pong. Clients connect over WebSocket, either
//! queue for a casual match or enter single-elimination tournaments, and steer their
//! paddle; the server alone simulates the ball, decides every point and records
//! results.
//!
//! ## Architecture
//!
//! ### Hub
//! One task, the [`hub::Hub`], owns everything shared between matches: the
//! connection registry, the matchmaking queue, the room table, tournaments and
//! display names. It handles one event at a time, so none of that state is locked.
//!
//! ### Rooms
//! Every match runs in its own task ([`room::run_room`]) with its own tick timer.
//! Rooms never share game state; a room only reports back to the hub once, after
//! its result has been persisted and announced.
//!
//! ### Network
//! [`network::ArenaServer`] accepts WebSocket connections, performs the
//! `session.hello` handshake and pumps JSON frames between sockets and the hub.
//! Outbound traffic uses a bounded queue per connection.
//!
//! ### Persistence
//! Results go through the [`store::PersistenceGateway`] trait. A failing store is
//! logged and never holds back a result.

pub mod config;
pub mod connections;
pub mod directory;
pub mod error;
pub mod hub;
pub mod matchmaking;
pub mod network;
pub mod room;
pub mod room_code;
pub mod room_registry;
pub mod store;
pub mod tournament;

pub use config::ArenaConfig;
pub use error::{ArenaError, Result};
pub use hub::{Hub, HubEvent, HubHandle};
pub use network::ArenaServer;
