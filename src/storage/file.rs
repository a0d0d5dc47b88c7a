use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use url::form_urlencoded;

use super::{KeyValueStore, StorageError};

/// One JSON file per key under a root directory. Writes go to a temporary
/// sibling first and are renamed into place, so a reader never observes a
/// half-written entry.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are form-urlencoded into file names: separators cannot appear,
    /// and distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
        self.root.join(format!("{file_name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::PuzzleId;
    use crate::state::ReplicatedState;
    use crate::storage::{load_state, save_state};
    use crate::test_utils::sample_puzzle;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("clover-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn entries_survive_reopening_the_store() {
        let dir = scratch_dir();
        let puzzle = sample_puzzle("21", 5);
        let mut state = ReplicatedState::for_puzzle(&puzzle);
        state.board.rotate(2, 3).unwrap();

        save_state(&FileStore::open(&dir).unwrap(), &puzzle.id, &state).unwrap();
        let reopened = FileStore::open(&dir).unwrap();
        assert_eq!(load_state(&reopened, &puzzle.id).unwrap(), Some(state));
        assert!(reopened.root().join("21%2Fstate.json").exists());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_entries_read_as_absent() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).unwrap();
        assert_eq!(store.get("nothing/state").unwrap(), None);
        store.remove("nothing/state").unwrap();
        assert_eq!(
            load_state(&store, &PuzzleId::new("nothing")).unwrap(),
            None
        );
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn similar_keys_keep_separate_entries() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).unwrap();
        let keys = ["a/state", "a_state", "a state", "a+state", "a%2Fstate"];
        for (n, key) in keys.iter().enumerate() {
            store.set(key, &n.to_string()).unwrap();
        }
        for (n, key) in keys.iter().enumerate() {
            assert_eq!(store.get(key).unwrap(), Some(n.to_string()), "key {key:?}");
        }

        store.remove("a/state").unwrap();
        assert_eq!(store.get("a/state").unwrap(), None);
        assert_eq!(store.get("a_state").unwrap().as_deref(), Some("1"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn keys_cannot_escape_the_root() {
        let dir = scratch_dir();
        let store = FileStore::open(&dir).unwrap();
        store.set("../outside/state", "{}").unwrap();
        assert!(store.path_for("../outside/state").starts_with(&dir));
        assert_eq!(store.get("../outside/state").unwrap().as_deref(), Some("{}"));
        fs::remove_dir_all(dir).ok();
    }
}
