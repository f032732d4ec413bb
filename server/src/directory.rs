//! Display names for user identifiers.

use arena_shared::physics::Slot;
use arena_shared::UserId;
use std::collections::HashMap;

pub const MAX_USERNAME_LEN: usize = 32;

/// Answers "what is this user called".
pub trait UserDirectory: Send {
    fn display_name(&self, user: UserId) -> Option<String>;

    fn remember(&mut self, user: UserId, name: &str);

    /// The user's name, or `Player <n>` for the seat they occupy.
    fn name_or_placeholder(&self, user: UserId, slot: Slot) -> String {
        self.display_name(user)
            .unwrap_or_else(|| format!("Player {}", slot.index() + 1))
    }
}

/// Keeps the names users announced when they connected.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    names: HashMap<UserId, String>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserDirectory for MemoryDirectory {
    fn display_name(&self, user: UserId) -> Option<String> {
        self.names.get(&user).cloned()
    }

    fn remember(&mut self, user: UserId, name: &str) {
        let name: String = name.trim().chars().take(MAX_USERNAME_LEN).collect();
        if name.is_empty() {
            return;
        }
        self.names.insert(user, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_names() {
        let mut directory = MemoryDirectory::new();
        directory.remember(UserId(1), "  alice  ");
        directory.remember(UserId(2), "   ");

        assert_eq!(directory.name_or_placeholder(UserId(1), Slot::Right), "alice");
        assert_eq!(directory.name_or_placeholder(UserId(2), Slot::Left), "Player 1");
        assert_eq!(directory.name_or_placeholder(UserId(3), Slot::Right), "Player 2");
    }

    #[test]
    fn test_long_names_are_truncated() {
        let mut directory = MemoryDirectory::new();
        directory.remember(UserId(1), &"x".repeat(100));
        assert_eq!(
            directory.display_name(UserId(1)).map(|n| n.len()),
            Some(MAX_USERNAME_LEN)
        );
    }
}
