//! Best-effort persistence of the room store across restarts.
//!
//! State is kept as JSON strings in a key-value store, one key per slice.
//! Missing or corrupt values load as defaults; failed writes are logged and
//! swallowed.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;

use crate::models::{Room, UserId};
use crate::store::RoomStore;

pub const CURRENT_ROOM_NAME_KEY: &str = "currentRoomName";
pub const ROOMS_KEY: &str = "rooms";
pub const SENDER_ID_KEY: &str = "senderId";

/// Durable string storage
pub trait KeyValueStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key in a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path(key)).ok()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).context("Failed to create state directory")?;
        // Write-then-rename so a crash never leaves a half-written value.
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {}", path.display()))
    }
}

/// In-process store
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    items: HashMap<String, String>,
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

pub struct Persistence<S: KeyValueStore> {
    store: S,
    /// Last value written per key, to skip rewriting unchanged state.
    written: HashMap<String, String>,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            written: HashMap::new(),
        }
    }

    /// Parsed value for `key`, or `default` if it is absent or unreadable.
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.store.get_item(key) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Ignoring unreadable saved {}: {}", key, e);
                default
            }
        }
    }

    /// Serialize and store `value`. Never fails; problems are logged.
    pub fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Could not serialize {}: {}", key, e);
                return;
            }
        };
        if self.written.get(key) == Some(&raw) {
            return;
        }
        match self.store.set_item(key, &raw) {
            Ok(()) => {
                self.written.insert(key.to_owned(), raw);
            }
            Err(e) => tracing::warn!("Failed to save {}: {:#}", key, e),
        }
    }

    /// Rehydrate a room store from the saved slices.
    pub fn load_store(&self) -> RoomStore {
        let current: Option<String> = self.load(CURRENT_ROOM_NAME_KEY, None);
        let rooms: BTreeMap<String, Room> = self.load(ROOMS_KEY, BTreeMap::new());
        let sender_id: Option<UserId> = self.load(SENDER_ID_KEY, None);
        RoomStore::from_parts(current.filter(|name| !name.is_empty()), rooms, sender_id)
    }

    pub fn save_store(&mut self, store: &RoomStore) {
        self.save(CURRENT_ROOM_NAME_KEY, &store.current_room_name());
        self.save(ROOMS_KEY, store.rooms());
        self.save(SENDER_ID_KEY, &store.sender_id());
    }
}
