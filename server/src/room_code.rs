//! Short, human friendly room codes.

use crate::error::{ArenaError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Uppercase letters and digits without the easily confused `I`, `O`, `0` and `1`.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// `(code length, attempts)` tried in order before giving up.
const ATTEMPT_PLAN: [(usize, u32); 2] = [(6, 10), (8, 20)];

/// Hands out codes that are unique among the currently reserved set.
///
/// A code stays reserved until [`RoomCodeAllocator::release`] is called for it,
/// which happens when its room is torn down.
pub struct RoomCodeAllocator {
    rng: StdRng,
    reserved: HashSet<String>,
}

impl Default for RoomCodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCodeAllocator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            reserved: HashSet::new(),
        }
    }

    pub fn allocate(&mut self) -> Result<String> {
        let mut attempts = 0;
        for (length, tries) in ATTEMPT_PLAN {
            for _ in 0..tries {
                attempts += 1;
                let code = self.generate(length);
                if self.reserved.insert(code.clone()) {
                    return Ok(code);
                }
            }
        }
        Err(ArenaError::AllocationExhausted { attempts })
    }

    /// Allocates `count` codes, or none at all.
    pub fn allocate_many(&mut self, count: usize) -> Result<Vec<String>> {
        let mut codes = Vec::with_capacity(count);
        for _ in 0..count {
            match self.allocate() {
                Ok(code) => codes.push(code),
                Err(e) => {
                    for code in &codes {
                        self.reserved.remove(code);
                    }
                    return Err(e);
                }
            }
        }
        Ok(codes)
    }

    pub fn release(&mut self, code: &str) -> bool {
        self.reserved.remove(code)
    }

    pub fn is_reserved(&self, code: &str) -> bool {
        self.reserved.contains(code)
    }

    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }

    fn generate(&mut self, length: usize) -> String {
        (0..length)
            .map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Marks a code as taken without generating it.
    #[cfg(test)]
    pub(crate) fn reserve(&mut self, code: &str) {
        self.reserved.insert(code.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_use_alphabet_and_short_length() {
        let mut allocator = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(1));
        for _ in 0..100 {
            let code = allocator.allocate().unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
            assert!(!code.contains('O') && !code.contains('0'));
        }
        assert_eq!(allocator.len(), 100);
    }

    #[test]
    fn test_codes_are_unique_until_released() {
        let mut allocator = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(2));
        let mut seen = HashSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(allocator.allocate().unwrap()));
        }

        let code = seen.iter().next().cloned().unwrap();
        assert!(allocator.is_reserved(&code));
        assert!(allocator.release(&code));
        assert!(!allocator.is_reserved(&code));
        assert!(!allocator.release(&code));
    }

    #[test]
    fn test_collisions_fall_back_to_longer_codes() {
        // Replay the same seed so the first short codes are known to collide.
        let mut replay = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(3));
        let mut allocator = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(3));
        for _ in 0..10 {
            let code = replay.generate(6);
            allocator.reserve(&code);
        }

        let code = allocator.allocate().unwrap();
        assert_eq!(code.len(), 8);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let mut replay = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(4));
        let mut allocator = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(4));
        for _ in 0..10 {
            let code = replay.generate(6);
            allocator.reserve(&code);
        }
        for _ in 0..20 {
            let code = replay.generate(8);
            allocator.reserve(&code);
        }

        assert_eq!(
            allocator.allocate(),
            Err(ArenaError::AllocationExhausted { attempts: 30 })
        );
    }

    #[test]
    fn test_allocate_many_is_all_or_nothing() {
        let mut replay = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(5));
        let mut allocator = RoomCodeAllocator::with_rng(StdRng::seed_from_u64(5));

        // First allocation succeeds, then the stream is poisoned.
        let first = replay.generate(6);
        for _ in 0..10 {
            let code = replay.generate(6);
            allocator.reserve(&code);
        }
        for _ in 0..20 {
            let code = replay.generate(8);
            allocator.reserve(&code);
        }
        let reserved_before = allocator.len();

        let result = allocator.allocate_many(2);
        assert!(matches!(result, Err(ArenaError::AllocationExhausted { .. })));
        assert!(!allocator.is_reserved(&first));
        assert_eq!(allocator.len(), reserved_before);
    }
}
