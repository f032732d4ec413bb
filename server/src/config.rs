//! Runtime configuration of the arena server.

use crate::room::RoomFlavor;
use arena_shared::physics::SCORE_LIMIT;
use std::path::PathBuf;
use std::time::Duration;

/// Knobs shared by the hub, the rooms and the network layer.
///
/// The binary fills this from command line arguments; tests start from
/// [`ArenaConfig::default`] and shorten the countdowns.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Address the WebSocket listener binds to, `host:port`.
    pub bind_addr: String,
    /// Simulation and broadcast rate of every room, in Hz.
    pub tick_rate: u32,
    /// Countdown before a casual match starts, in seconds.
    pub casual_countdown: u32,
    /// Countdown before a tournament match starts, in seconds.
    pub tournament_countdown: u32,
    pub score_limit: u32,
    pub max_connections: usize,
    /// Connections silent for longer than this are closed.
    pub idle_timeout: Duration,
    /// Time a fresh connection has to send `session.hello`.
    pub hello_timeout: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Append-only journal backing the match store. `None` keeps results in memory only.
    pub journal: Option<PathBuf>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_rate: 60,
            casual_countdown: 5,
            tournament_countdown: 3,
            score_limit: SCORE_LIMIT,
            max_connections: 1024,
            idle_timeout: Duration::from_secs(60),
            hello_timeout: Duration::from_secs(5),
            outbound_buffer: 256,
            journal: None,
        }
    }
}

impl ArenaConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn countdown(&self, flavor: RoomFlavor) -> u32 {
        match flavor {
            RoomFlavor::Casual => self.casual_countdown,
            RoomFlavor::Tournament => self.tournament_countdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArenaConfig::default();
        assert_eq!(config.countdown(RoomFlavor::Casual), 5);
        assert_eq!(config.countdown(RoomFlavor::Tournament), 3);
        assert_eq!(config.score_limit, 5);
        assert_eq!(config.tick_interval(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn test_zero_tick_rate_does_not_divide_by_zero() {
        let config = ArenaConfig {
            tick_rate: 0,
            ..ArenaConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
