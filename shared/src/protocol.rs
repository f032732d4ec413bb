//! JSON messages exchanged between clients and the arena server.
//!
//! Every frame is an object `{ "event": <name>, "data": <payload> }`. Client frames may
//! carry an `ack` number, in which case the server answers with exactly one
//! [`ServerMessage::Ack`] echoing it. Events without a payload omit `data`.

use crate::ids::{ConnectionId, MatchId, ParticipantId, TournamentId, UserId};
use crate::physics::{Direction, GameState, Slot, TerminationReason};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// First frame on every connection.
    #[serde(rename = "session.hello", rename_all = "camelCase")]
    Hello { user_id: UserId, username: String },

    #[serde(rename = "queue.enter")]
    EnterQueue,
    #[serde(rename = "queue.leave")]
    LeaveQueue,

    #[serde(rename = "match.join", rename_all = "camelCase")]
    JoinMatch { room_code: String },
    #[serde(rename = "match.input", rename_all = "camelCase")]
    Input {
        #[serde(alias = "roomId")]
        room_code: String,
        slot: Slot,
        direction: Direction,
    },
    #[serde(rename = "match.leave", rename_all = "camelCase")]
    LeaveMatch {
        #[serde(alias = "roomId")]
        room_code: String,
    },

    #[serde(rename = "tournament.list")]
    ListTournaments,
    #[serde(rename = "tournament.create", rename_all = "camelCase")]
    CreateTournament { name: String, max_participants: u32 },
    #[serde(rename = "tournament.join")]
    JoinTournament { id: TournamentId },
    #[serde(rename = "tournament.start")]
    StartTournament { id: TournamentId },

    #[serde(rename = "stats.fetch")]
    FetchStats,
    #[serde(rename = "history.fetch")]
    FetchHistory {
        #[serde(default = "default_page")]
        page: u32,
        #[serde(default = "default_limit")]
        limit: u32,
    },

    #[serde(rename = "ping")]
    Ping,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

impl ClientMessage {
    /// Event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Hello { .. } => "session.hello",
            ClientMessage::EnterQueue => "queue.enter",
            ClientMessage::LeaveQueue => "queue.leave",
            ClientMessage::JoinMatch { .. } => "match.join",
            ClientMessage::Input { .. } => "match.input",
            ClientMessage::LeaveMatch { .. } => "match.leave",
            ClientMessage::ListTournaments => "tournament.list",
            ClientMessage::CreateTournament { .. } => "tournament.create",
            ClientMessage::JoinTournament { .. } => "tournament.join",
            ClientMessage::StartTournament { .. } => "tournament.start",
            ClientMessage::FetchStats => "stats.fetch",
            ClientMessage::FetchHistory { .. } => "history.fetch",
            ClientMessage::Ping => "ping",
        }
    }
}

/// A client frame together with its optional acknowledgement number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    #[serde(flatten)]
    pub message: ClientMessage,
}

impl ClientEnvelope {
    pub fn new(message: ClientMessage) -> Self {
        Self { ack: None, message }
    }

    pub fn with_ack(ack: u64, message: ClientMessage) -> Self {
        Self {
            ack: Some(ack),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "session.welcome", rename_all = "camelCase")]
    Welcome {
        connection_id: ConnectionId,
        user_id: UserId,
    },

    #[serde(rename = "queue.waiting")]
    QueueWaiting,

    /// Sent to both players of a fresh casual room.
    #[serde(rename = "match.paired", rename_all = "camelCase")]
    Paired {
        room_code: String,
        participants: [UserId; 2],
        usernames: [String; 2],
        /// The slot the recipient plays.
        slot: Slot,
        state: GameState,
    },

    /// Sent to the two participants of a newly bound bracket match.
    #[serde(rename = "match.assigned", rename_all = "camelCase")]
    Assigned {
        tournament_id: TournamentId,
        match_id: MatchId,
        round: u32,
        room_code: String,
        players: [String; 2],
    },

    #[serde(rename = "match.playerJoined", rename_all = "camelCase")]
    PlayerJoined {
        room_code: String,
        usernames: [String; 2],
        joined: [bool; 2],
    },

    #[serde(rename = "match.countdown", rename_all = "camelCase")]
    Countdown {
        room_code: String,
        seconds_remaining: u32,
    },

    #[serde(rename = "match.begin", rename_all = "camelCase")]
    Begin { room_code: String },

    #[serde(rename = "match.tick", rename_all = "camelCase")]
    Tick { room_code: String, state: GameState },

    #[serde(rename = "match.playerLeft", rename_all = "camelCase")]
    PlayerLeft { room_code: String, slot: Slot },

    #[serde(rename = "match.finished")]
    Finished(MatchResult),

    #[serde(rename = "tournament.created")]
    TournamentCreated(TournamentView),
    #[serde(rename = "tournament.updated")]
    TournamentUpdated(TournamentView),
    #[serde(rename = "tournament.started")]
    TournamentStarted(TournamentView),
    #[serde(rename = "tournament.roomFull", rename_all = "camelCase")]
    RoomFull {
        tournament_id: TournamentId,
        tournament_name: String,
        message: String,
    },

    #[serde(rename = "ack")]
    Ack(Reply),

    #[serde(rename = "error")]
    Error { code: String, message: String },

    #[serde(rename = "pong")]
    Pong,
}

/// Terminal event of a room, tailored per recipient through `has_next_match`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub room_code: String,
    pub winner_slot: Option<Slot>,
    pub winner_name: Option<String>,
    pub usernames: [String; 2],
    pub scores: [u32; 2],
    pub reason: TerminationReason,
    #[serde(default)]
    pub has_next_match: bool,
}

/// Answer to a client frame that carried an `ack` number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub ack: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament: Option<TournamentView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournaments: Option<Vec<TournamentView>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined: Option<MatchJoined>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PlayerStats>,
}

impl Reply {
    /// A successful reply whose ack number is filled in when it is sent.
    pub fn success() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn ok(ack: u64) -> Self {
        Self {
            ack,
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(ack: u64, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ack,
            success: false,
            code: Some(code.into()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_tournament(mut self, tournament: TournamentView) -> Self {
        self.tournament = Some(tournament);
        self
    }

    pub fn with_tournaments(mut self, tournaments: Vec<TournamentView>) -> Self {
        self.tournaments = Some(tournaments);
        self
    }

    pub fn with_joined(mut self, joined: MatchJoined) -> Self {
        self.joined = Some(joined);
        self
    }

    pub fn with_history(mut self, history: HistoryPage) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_stats(mut self, stats: PlayerStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    Pending,
    Ongoing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pending,
    Ongoing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    pub id: TournamentId,
    pub name: String,
    pub creator_id: UserId,
    pub max_participants: u32,
    pub status: TournamentStatus,
    pub current_round: u32,
    pub participants: Vec<ParticipantView>,
    pub matches: Vec<MatchView>,
    pub champion: Option<ParticipantId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub user_id: UserId,
    pub username: String,
    pub eliminated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: MatchId,
    pub round: u32,
    pub player1: Option<ParticipantId>,
    pub player2: Option<ParticipantId>,
    pub winner: Option<ParticipantId>,
    pub scores: [u32; 2],
    pub status: MatchStatus,
    pub room_code: Option<String>,
}

/// Acknowledgement payload of a successful `match.join`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchJoined {
    pub room_code: String,
    pub slot: Slot,
    pub usernames: [String; 2],
    pub state: GameState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub opponent_id: UserId,
    pub my_score: u32,
    pub opponent_score: u32,
    pub is_win: bool,
    pub is_draw: bool,
    /// Seconds since the Unix epoch.
    pub played_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub total_games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// Percentage of games won, rounded to one decimal.
    pub win_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_payloadless_event() {
        let envelope: ClientEnvelope = serde_json::from_str(r#"{"event":"queue.enter"}"#).unwrap();
        assert_eq!(envelope.ack, None);
        assert_eq!(envelope.message, ClientMessage::EnterQueue);
    }

    #[test]
    fn test_parse_event_with_ack() {
        let envelope: ClientEnvelope = serde_json::from_str(
            r#"{"event":"tournament.create","data":{"name":"Friday","maxParticipants":4},"ack":3}"#,
        )
        .unwrap();

        assert_eq!(envelope.ack, Some(3));
        assert_eq!(
            envelope.message,
            ClientMessage::CreateTournament {
                name: "Friday".to_string(),
                max_participants: 4,
            }
        );
    }

    #[test]
    fn test_input_clamps_direction_and_accepts_room_id_alias() {
        let envelope: ClientEnvelope = serde_json::from_str(
            r#"{"event":"match.input","data":{"roomId":"ABCDEF","slot":1,"direction":-12.5}}"#,
        )
        .unwrap();

        assert_eq!(
            envelope.message,
            ClientMessage::Input {
                room_code: "ABCDEF".to_string(),
                slot: Slot::Right,
                direction: Direction::Up,
            }
        );
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        let bad = [
            r#"{"event":"match.input","data":{"roomCode":"A","slot":4,"direction":0}}"#,
            r#"{"event":"tournament.join","data":{"id":"seven"}}"#,
            r#"{"event":"no.such.event"}"#,
            r#"{"data":{}}"#,
            "not json",
        ];
        for frame in bad {
            assert!(
                serde_json::from_str::<ClientEnvelope>(frame).is_err(),
                "{} should not parse",
                frame
            );
        }
    }

    #[test]
    fn test_history_defaults() {
        let envelope: ClientEnvelope =
            serde_json::from_str(r#"{"event":"history.fetch","data":{}}"#).unwrap();
        assert_eq!(
            envelope.message,
            ClientMessage::FetchHistory { page: 1, limit: 10 }
        );
    }

    #[test]
    fn test_reply_omits_empty_fields() {
        let value = serde_json::to_value(ServerMessage::Ack(Reply::failure(
            9,
            "NOT_CREATOR",
            "only the creator can start",
        )))
        .unwrap();

        assert_eq!(
            value,
            json!({
                "event": "ack",
                "data": {
                    "ack": 9,
                    "success": false,
                    "code": "NOT_CREATOR",
                    "message": "only the creator can start"
                }
            })
        );
    }

    #[test]
    fn test_finished_event_shape() {
        let message = ServerMessage::Finished(MatchResult {
            room_code: "QWERTY".to_string(),
            winner_slot: Some(Slot::Right),
            winner_name: Some("bob".to_string()),
            usernames: ["alice".to_string(), "bob".to_string()],
            scores: [3, 5],
            reason: TerminationReason::ScoreLimit,
            has_next_match: false,
        });

        let value: Value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["event"], "match.finished");
        assert_eq!(value["data"]["winnerSlot"], 1);
        assert_eq!(value["data"]["reason"], "score_limit");
        assert_eq!(value["data"]["hasNextMatch"], false);
    }

    #[test]
    fn test_client_message_names_match_wire_tags() {
        let messages = [
            ClientMessage::EnterQueue,
            ClientMessage::JoinTournament { id: TournamentId(1) },
            ClientMessage::FetchHistory { page: 2, limit: 5 },
            ClientMessage::Ping,
        ];
        for message in messages {
            let value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["event"], message.name());
        }
    }
}
