//! # Summary
//!
//! Optional stable storage for failure recovery. Acceptor/Leader/Replica
//! state is in-memory only by default (a crashed member loses its role
//! state); this module is an opt-in extension via `Config::with_storage_dir`.
//!
//! Every `save` truncates the file and re-serializes the whole state from
//! scratch with `bincode`.

use std::io::Seek;

use crate::error::StorageError;

/// Stable storage for a single role's persisted state, backed by one file
/// per role per process.
pub struct Storage<S> {
    file: std::fs::File,
    _marker: std::marker::PhantomData<S>,
}

impl<S> Storage<S> {
    /// Opens (creating if necessary) a stable storage file at `path`.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| StorageError::Open { path: path.to_path_buf(), source })?;
        Ok(Storage { file, _marker: std::marker::PhantomData })
    }
}

impl<S: serde::de::DeserializeOwned> Storage<S> {
    /// Loads state from disk, returning `None` if nothing has been
    /// written yet or the contents can't be deserialized (e.g. the file
    /// was truncated mid-write by a prior crash).
    pub fn load(&self) -> Option<S> {
        bincode::deserialize_from(&self.file).ok()
    }
}

impl<S: serde::Serialize> Storage<S> {
    /// Overwrites the file with the serialized form of `state`.
    pub fn save(&mut self, state: &S) -> Result<(), StorageError> {
        self.file.set_len(0).map_err(StorageError::Write)?;
        self.file.seek(std::io::SeekFrom::Start(0)).map_err(StorageError::Write)?;
        bincode::serialize_into(&mut self.file, state).map_err(StorageError::Serialize)
    }
}
