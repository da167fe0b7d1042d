//! Two-way mapping between the selected room and an external location path.
//!
//! `/room/<percent-encoded name>` selects a room, `/` selects none. A session
//! history stack models back/forward navigation.

const ROOM_PREFIX: &str = "/room/";
pub const ROOT: &str = "/";

/// Location path for a room, or the root when no room is selected.
pub fn location_for(room: Option<&str>) -> String {
    match room {
        Some(name) if !name.is_empty() => format!("{}{}", ROOM_PREFIX, urlencoding::encode(name)),
        _ => ROOT.to_string(),
    }
}

/// Room named by a location path. `None` for the root and for paths that
/// don't name a room.
pub fn room_from_location(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    let encoded = path.strip_prefix(ROOM_PREFIX)?;
    let encoded = encoded.split('/').next().unwrap_or_default();
    if encoded.is_empty() {
        return None;
    }
    match urlencoding::decode(encoded) {
        Ok(name) => Some(name.into_owned()),
        Err(e) => {
            tracing::debug!("Undecodable room in location {}: {}", location, e);
            None
        }
    }
}

/// What an external location change asks of the room store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Join (if needed) and select this room.
    Select(String),
    Deselect,
}

pub struct Navigator {
    history: Vec<String>,
    cursor: usize,
}

impl Navigator {
    pub fn new(initial: &str) -> Self {
        Self {
            history: vec![initial.to_string()],
            cursor: 0,
        }
    }

    pub fn location(&self) -> &str {
        &self.history[self.cursor]
    }

    /// Record that `room` was selected locally. Pushes a new history entry
    /// unless the location already reflects it, so a selection that came from
    /// the location never feeds back into it. Returns whether it pushed.
    pub fn push_room(&mut self, room: Option<&str>) -> bool {
        let next = location_for(room);
        if next == self.location() {
            return false;
        }
        self.history.truncate(self.cursor + 1);
        self.history.push(next);
        self.cursor += 1;
        true
    }

    /// Resolve an external location against the current room. `None` means
    /// nothing needs to change.
    pub fn resolve(location: &str, current_room: Option<&str>) -> Option<Navigation> {
        match room_from_location(location) {
            Some(room) if current_room != Some(room.as_str()) => Some(Navigation::Select(room)),
            Some(_) => None,
            None if location_is_root(location) && current_room.is_some() => {
                Some(Navigation::Deselect)
            }
            None => None,
        }
    }

    /// Jump to a location, as if typed into the address bar. Paths that
    /// name neither a room nor the root are refused and leave history alone.
    pub fn go(&mut self, location: &str) -> Option<&str> {
        let location = if location.starts_with('/') {
            location.to_string()
        } else {
            format!("/{}", location)
        };
        if room_from_location(&location).is_none() && !location_is_root(&location) {
            return None;
        }
        if location != self.location() {
            self.history.truncate(self.cursor + 1);
            self.history.push(location);
            self.cursor += 1;
        }
        Some(self.location())
    }

    pub fn back(&mut self) -> Option<&str> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.location())
    }

    pub fn forward(&mut self) -> Option<&str> {
        if self.cursor + 1 >= self.history.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.location())
    }
}

fn location_is_root(location: &str) -> bool {
    location.split(['?', '#']).next() == Some(ROOT)
}
