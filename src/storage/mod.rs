//! Local durable cache of solver state, keyed by puzzle id.

use thiserror::Error;
use tracing::warn;

use crate::puzzle::{Puzzle, PuzzleId};
use crate::state::ReplicatedState;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

const LOG_TARGET: &str = "clover::storage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored state could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// String key/value storage that survives restarts until cleared.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub fn load_state(
    store: &dyn KeyValueStore,
    puzzle_id: &PuzzleId,
) -> Result<Option<ReplicatedState>, StorageError> {
    match store.get(&puzzle_id.state_key())? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn save_state(
    store: &dyn KeyValueStore,
    puzzle_id: &PuzzleId,
    state: &ReplicatedState,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(state)?;
    store.set(&puzzle_id.state_key(), &raw)
}

pub fn clear_state(store: &dyn KeyValueStore, puzzle_id: &PuzzleId) -> Result<(), StorageError> {
    store.remove(&puzzle_id.state_key())
}

/// Cached state for `puzzle`, or `None` when nothing usable is cached.
/// Unreadable entries and layouts that do not fit the puzzle are dropped
/// with a warning.
pub fn load_usable_state(store: &dyn KeyValueStore, puzzle: &Puzzle) -> Option<ReplicatedState> {
    let cached = match load_state(store, &puzzle.id) {
        Ok(cached) => cached?,
        Err(err) => {
            warn!(target: LOG_TARGET, puzzle_id = %puzzle.id, error = %err, "discarding unreadable cached state");
            return None;
        }
    };
    if let Err(err) = cached.board.validate(puzzle) {
        warn!(target: LOG_TARGET, puzzle_id = %puzzle.id, error = %err, "discarding cached state for a different layout");
        return None;
    }
    Some(cached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_puzzle;

    #[test]
    fn saved_state_reloads_equal() {
        let store = MemoryStore::new();
        let puzzle = sample_puzzle("11", 6);
        let mut state = ReplicatedState::for_puzzle(&puzzle);
        state.board.swap(0, 5).unwrap();
        state.copied_to_clipboard = true;

        save_state(&store, &puzzle.id, &state).unwrap();
        assert_eq!(load_state(&store, &puzzle.id).unwrap(), Some(state));
        assert!(store.get("11/state").unwrap().is_some());
    }

    #[test]
    fn corrupt_or_mismatched_entries_are_not_usable() {
        let store = MemoryStore::new();
        let puzzle = sample_puzzle("12", 5);

        store.set(&puzzle.id.state_key(), "{not json").unwrap();
        assert!(load_state(&store, &puzzle.id).is_err());
        assert_eq!(load_usable_state(&store, &puzzle), None);

        let other = ReplicatedState::for_puzzle(&sample_puzzle("12", 7));
        save_state(&store, &puzzle.id, &other).unwrap();
        assert_eq!(load_usable_state(&store, &puzzle), None);

        let fitting = ReplicatedState::for_puzzle(&puzzle);
        save_state(&store, &puzzle.id, &fitting).unwrap();
        assert_eq!(load_usable_state(&store, &puzzle), Some(fitting));
    }

    #[test]
    fn clear_removes_the_entry() {
        let store = MemoryStore::new();
        let puzzle = sample_puzzle("13", 4);
        save_state(&store, &puzzle.id, &ReplicatedState::for_puzzle(&puzzle)).unwrap();
        clear_state(&store, &puzzle.id).unwrap();
        assert_eq!(load_state(&store, &puzzle.id).unwrap(), None);
    }
}
