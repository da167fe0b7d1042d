//! Room store: the single in-memory source of truth for joined rooms, the
//! selected room and the local sender identity.
//!
//! Every mutation goes through a method here. Operations addressed to a room
//! that isn't in the store are silent no-ops, since inbound events can race a
//! local leave.

pub mod inserter;
pub mod presence;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use crate::channel::ChannelEvents;
use crate::models::{IncomingMessage, PresenceEvent, Room, UserId, UserPatch};

pub struct RoomStore {
    current_room_name: Option<String>,
    rooms: BTreeMap<String, Room>,
    sender_id: Option<UserId>,
    rng: StdRng,
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore {
    pub fn new() -> Self {
        Self::from_parts(None, BTreeMap::new(), None)
    }

    /// Rebuild a store from rehydrated state. A current room that isn't among
    /// `rooms` is dropped.
    pub fn from_parts(
        current_room_name: Option<String>,
        rooms: BTreeMap<String, Room>,
        sender_id: Option<UserId>,
    ) -> Self {
        let current_room_name = current_room_name.filter(|name| rooms.contains_key(name));
        Self {
            current_room_name,
            rooms,
            sender_id,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic hue assignment for tests.
    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new()
        }
    }

    pub fn current_room_name(&self) -> Option<&str> {
        self.current_room_name.as_deref()
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.current_room_name
            .as_ref()
            .and_then(|name| self.rooms.get(name))
    }

    pub fn rooms(&self) -> &BTreeMap<String, Room> {
        &self.rooms
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    /// The local identity as of now. Handlers must read it here at call time.
    pub fn sender_id(&self) -> Option<&str> {
        self.sender_id.as_deref()
    }

    /// Record the identity assigned by the latest channel join.
    pub fn set_sender_id(&mut self, sender_id: UserId) {
        if self.sender_id.as_deref() != Some(sender_id.as_str()) {
            tracing::debug!("Sender id is now {}", sender_id);
        }
        self.sender_id = Some(sender_id);
    }

    /// Create an empty room. Returns `false` if it already existed or the
    /// name is empty.
    pub fn join_room(&mut self, name: &str) -> bool {
        if name.is_empty() || self.rooms.contains_key(name) {
            return false;
        }
        tracing::info!("Joined room '{}'", name);
        self.rooms.insert(name.to_owned(), Room::default());
        true
    }

    /// Point "current room" at `name`. Unknown rooms are ignored.
    pub fn select_room(&mut self, name: &str) -> bool {
        if !self.rooms.contains_key(name) {
            return false;
        }
        self.current_room_name = Some(name.to_owned());
        true
    }

    pub fn deselect_room(&mut self) {
        self.current_room_name = None;
    }

    /// Forget a room and its history. Deselects it first if it was current.
    pub fn leave_room(&mut self, name: &str) -> Option<Room> {
        if self.current_room_name.as_deref() == Some(name) {
            self.deselect_room();
        }
        let room = self.rooms.remove(name);
        if room.is_some() {
            tracing::info!("Left room '{}'", name);
        }
        room
    }

    /// Set (or with `None`, clear) the local display name in a room, and
    /// mirror a new name onto the local user's presence entry.
    pub fn set_sender_name(&mut self, room_name: &str, name: Option<String>) {
        let Some(room) = self.rooms.get_mut(room_name) else {
            return;
        };
        room.sender_name = name.clone();
        if let (Some(id), Some(name)) = (self.sender_id.as_deref(), name) {
            presence::update_user(
                room,
                id,
                UserPatch {
                    name: Some(name),
                    last_online: None,
                },
                &mut self.rng,
            );
        }
    }

    /// Insert a message exactly once. Returns whether the room's history changed.
    pub fn receive_message(&mut self, room_name: &str, message: IncomingMessage) -> bool {
        let Some(room) = self.rooms.get_mut(room_name) else {
            tracing::debug!("Dropping message {} for unknown room '{}'", message.id, room_name);
            return false;
        };
        inserter::insert_message(room, self.sender_id.as_deref(), message, &mut self.rng)
    }

    /// Apply a presence snapshot or diff. Events for unknown rooms, full
    /// snapshots included, are dropped rather than buffered.
    pub fn apply_presence(&mut self, room_name: &str, event: PresenceEvent) {
        let Some(room) = self.rooms.get_mut(room_name) else {
            tracing::debug!("Dropping presence for unknown room '{}'", room_name);
            return;
        };
        presence::apply(room, event, &mut self.rng);
    }
}

impl ChannelEvents for RoomStore {
    fn on_joined(&mut self, room: &str, sender_id: Option<UserId>) {
        match sender_id {
            Some(id) => self.set_sender_id(id),
            None => tracing::warn!("Join reply for '{}' carried no sender id", room),
        }
    }

    fn on_message(&mut self, room: &str, message: IncomingMessage) {
        self.receive_message(room, message);
    }

    fn on_presence(&mut self, room: &str, event: PresenceEvent) {
        self.apply_presence(room, event);
    }
}
