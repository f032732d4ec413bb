//! Error types for the arena server.
//!
//! Every request-scoped failure is an [`ArenaError`]. None of them is fatal to the
//! process: they are turned into a failed acknowledgement or an `error` frame for the
//! connection that caused them.

use crate::store::StoreError;
use arena_shared::{TournamentId, UserId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArenaError>;

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    Exhausted,
    /// A collaborator failed; the request may succeed later.
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("room {code} not found")]
    RoomNotFound { code: String },

    #[error("tournament {id} not found")]
    TournamentNotFound { id: TournamentId },

    #[error("user {user} is not a participant")]
    NotParticipant { user: UserId },

    #[error("only the creator can start tournament {id}")]
    NotCreator { id: TournamentId },

    #[error("tournament {id} is full ({max} participants)")]
    CapacityExceeded { id: TournamentId, max: u32 },

    #[error("user {user} already joined tournament {id}")]
    AlreadyJoined { id: TournamentId, user: UserId },

    #[error("tournament {id} needs {required} participants, has {joined}")]
    InsufficientParticipants {
        id: TournamentId,
        joined: u32,
        required: u32,
    },

    #[error("{what} is not joinable")]
    NotJoinable { what: String },

    #[error("no free room code after {attempts} attempts")]
    AllocationExhausted { attempts: u32 },

    #[error("server is at capacity")]
    ServerFull,

    #[error("session not established")]
    NoSession,

    #[error("match store failed: {reason}")]
    Storage { reason: String },
}

impl From<StoreError> for ArenaError {
    fn from(e: StoreError) -> Self {
        ArenaError::Storage {
            reason: e.to_string(),
        }
    }
}

impl ArenaError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    pub fn room_not_found(code: impl Into<String>) -> Self {
        Self::RoomNotFound { code: code.into() }
    }

    pub fn not_joinable(what: impl Into<String>) -> Self {
        Self::NotJoinable { what: what.into() }
    }

    /// Stable machine readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ArenaError::InvalidPayload { .. } => "INVALID_PAYLOAD",
            ArenaError::RoomNotFound { .. } => "ROOM_NOT_FOUND",
            ArenaError::TournamentNotFound { .. } => "TOURNAMENT_NOT_FOUND",
            ArenaError::NotParticipant { .. } => "NOT_PARTICIPANT",
            ArenaError::NotCreator { .. } => "NOT_CREATOR",
            ArenaError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            ArenaError::AlreadyJoined { .. } => "ALREADY_JOINED",
            ArenaError::InsufficientParticipants { .. } => "INSUFFICIENT_PARTICIPANTS",
            ArenaError::NotJoinable { .. } => "NOT_JOINABLE",
            ArenaError::AllocationExhausted { .. } => "ALLOCATION_EXHAUSTED",
            ArenaError::ServerFull => "SERVER_FULL",
            ArenaError::NoSession => "NO_SESSION",
            ArenaError::Storage { .. } => "STORAGE_FAILURE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ArenaError::InvalidPayload { .. }
            | ArenaError::RoomNotFound { .. }
            | ArenaError::TournamentNotFound { .. }
            | ArenaError::NoSession => ErrorKind::Validation,
            ArenaError::NotParticipant { .. } | ArenaError::NotCreator { .. } => {
                ErrorKind::Authorization
            }
            ArenaError::CapacityExceeded { .. }
            | ArenaError::AlreadyJoined { .. }
            | ArenaError::InsufficientParticipants { .. }
            | ArenaError::NotJoinable { .. } => ErrorKind::Conflict,
            ArenaError::AllocationExhausted { .. } | ArenaError::ServerFull => {
                ErrorKind::Exhausted
            }
            ArenaError::Storage { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_kinds() {
        let err = ArenaError::CapacityExceeded {
            id: TournamentId(3),
            max: 4,
        };
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "tournament 3 is full (4 participants)");

        let err = ArenaError::NotCreator { id: TournamentId(1) };
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let err = ArenaError::AllocationExhausted { attempts: 30 };
        assert_eq!(err.code(), "ALLOCATION_EXHAUSTED");
        assert_eq!(err.kind(), ErrorKind::Exhausted);
    }

    #[test]
    fn test_helper_constructors() {
        assert_eq!(
            ArenaError::room_not_found("ZZZZZZ"),
            ArenaError::RoomNotFound {
                code: "ZZZZZZ".to_string()
            }
        );
        assert_eq!(ArenaError::invalid_payload("bad").code(), "INVALID_PAYLOAD");
    }

    #[test]
    fn test_store_errors_convert() {
        let err = ArenaError::from(StoreError::Unavailable("disk gone".to_string()));
        assert_eq!(err.code(), "STORAGE_FAILURE");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
