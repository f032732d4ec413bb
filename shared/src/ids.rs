//! Strongly typed identifiers carried on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Stable identity of a user, issued by the external account system.
    UserId
);
id_type!(
    /// A tournament record.
    TournamentId
);
id_type!(
    /// A user's enrollment in one tournament.
    ParticipantId
);
id_type!(
    /// A bracket match inside a tournament.
    MatchId
);
id_type!(
    /// One live client connection. A user may hold several at once.
    ConnectionId
);
