//! Chat engine: owns the room store, channels, navigation and persistence,
//! and handles one transport event or user intent at a time.
//!
//! After each event or intent a reconciliation pass opens a channel for every
//! room in the store, closes channels whose room is gone, and saves the store.

pub mod commands;
pub mod view;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::channel::protocol::Frame;
use crate::channel::socket::TransportEvent;
use crate::channel::ChannelManager;
use crate::error::ChatError;
use crate::models::MessageId;
use crate::navigation::{location_for, Navigation, Navigator};
use crate::storage::{KeyValueStore, Persistence};
use crate::store::RoomStore;
use commands::Command;

/// Messages shown when switching into a room.
const BACKLOG_LINES: usize = 20;

/// Result of one typed command.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue(Vec<String>),
    Quit,
}

pub struct ChatClient<S: KeyValueStore> {
    store: RoomStore,
    channels: ChannelManager,
    nav: Navigator,
    persistence: Persistence<S>,
}

impl<S: KeyValueStore> ChatClient<S> {
    /// Rehydrate from `persistence` and open channels for the saved rooms.
    pub fn new(persistence: Persistence<S>, outbound: mpsc::UnboundedSender<Frame>) -> Self {
        let store = persistence.load_store();
        Self::with_store(store, persistence, outbound)
    }

    fn with_store(
        store: RoomStore,
        persistence: Persistence<S>,
        outbound: mpsc::UnboundedSender<Frame>,
    ) -> Self {
        let nav = Navigator::new(&location_for(store.current_room_name()));
        let mut client = Self {
            store,
            channels: ChannelManager::new(outbound),
            nav,
            persistence,
        };
        client.reconcile();
        client
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    pub fn location(&self) -> &str {
        self.nav.location()
    }

    fn current_room_name(&self) -> Result<String, ChatError> {
        self.store
            .current_room_name()
            .map(str::to_owned)
            .ok_or(ChatError::NoRoomSelected)
    }

    /// Join without selecting. Joining a room that is already known retries
    /// its channel if the last join failed.
    pub fn join_room(&mut self, name: &str) {
        if self.store.join_room(name) || self.store.room(name).is_some() {
            self.channels.ensure_channel(name);
        }
        self.reconcile();
    }

    /// Join if needed, make current, and record the new location.
    pub fn select_room(&mut self, name: &str) {
        self.enter_room(name);
        self.nav.push_room(self.store.current_room_name());
        self.reconcile();
    }

    fn enter_room(&mut self, name: &str) {
        if self.store.join_room(name) || self.store.room(name).is_some() {
            self.channels.ensure_channel(name);
        }
        self.store.select_room(name);
    }

    pub fn deselect_room(&mut self) {
        self.store.deselect_room();
        self.nav.push_room(None);
        self.reconcile();
    }

    /// Leave the current room, dropping its history and channel.
    pub fn leave_room(&mut self) -> Result<String, ChatError> {
        let name = self.current_room_name()?;
        self.store.leave_room(&name);
        self.channels.close_channel(&name);
        self.nav.push_room(None);
        self.reconcile();
        Ok(name)
    }

    /// Push `text` to the current room under the room's display name.
    pub fn send_message(&mut self, text: &str) -> Result<(), ChatError> {
        let name = self.current_room_name()?;
        let sender_name = self
            .store
            .room(&name)
            .and_then(|room| room.sender_name.clone());
        self.channels
            .send_message(&name, text, sender_name.as_deref())
    }

    pub fn set_sender_name(&mut self, sender_name: Option<String>) -> Result<(), ChatError> {
        let name = self.current_room_name()?;
        self.store.set_sender_name(&name, sender_name);
        self.reconcile();
        Ok(())
    }

    /// Navigate to a room location or the root.
    pub fn go(&mut self, location: &str) -> Result<(), ChatError> {
        let Some(target) = self.nav.go(location).map(str::to_owned) else {
            return Err(ChatError::UnknownLocation(location.to_owned()));
        };
        self.follow_location(&target);
        Ok(())
    }

    pub fn back(&mut self) -> bool {
        match self.nav.back().map(str::to_owned) {
            Some(location) => {
                self.follow_location(&location);
                true
            }
            None => false,
        }
    }

    pub fn forward(&mut self) -> bool {
        match self.nav.forward().map(str::to_owned) {
            Some(location) => {
                self.follow_location(&location);
                true
            }
            None => false,
        }
    }

    /// Bring the store in line with a location that changed from outside.
    /// The location itself is already current, so nothing is pushed.
    fn follow_location(&mut self, location: &str) {
        match Navigator::resolve(location, self.store.current_room_name()) {
            Some(Navigation::Select(room)) => self.enter_room(&room),
            Some(Navigation::Deselect) => self.store.deselect_room(),
            None => {}
        }
        self.reconcile();
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.channels.handle_connected(),
            TransportEvent::Frame(frame) => self.channels.handle_frame(frame, &mut self.store),
            TransportEvent::Disconnected(reason) => {
                tracing::debug!("Channels offline: {}", reason);
                self.channels.handle_disconnected();
            }
        }
        self.reconcile();
    }

    /// Open missing channels, close orphaned ones, then persist.
    ///
    /// Errored channels are left alone here; they rejoin on reconnect or when
    /// the room is joined again.
    fn reconcile(&mut self) {
        let orphaned: Vec<String> = self
            .channels
            .rooms()
            .filter(|room| self.store.room(room).is_none())
            .map(str::to_owned)
            .collect();
        for room in orphaned {
            self.channels.close_channel(&room);
        }

        let missing: Vec<String> = self
            .store
            .rooms()
            .keys()
            .filter(|room| self.channels.state(room).is_none())
            .cloned()
            .collect();
        for room in missing {
            self.channels.ensure_channel(&room);
        }

        self.persistence.save_store(&self.store);
    }

    /// Run one typed command, returning what to print.
    pub fn execute(&mut self, command: Command) -> Result<Outcome, ChatError> {
        let lines = match command {
            Command::Say(text) => {
                self.send_message(&text)?;
                Vec::new()
            }
            Command::Join(name) => {
                self.join_room(&name);
                vec![format!("Joined '{}'", name)]
            }
            Command::Select(name) => {
                self.select_room(&name);
                self.room_banner()
            }
            Command::Leave => {
                let name = self.leave_room()?;
                vec![format!("Left '{}'", name)]
            }
            Command::Deselect => {
                self.deselect_room();
                self.room_banner()
            }
            Command::Name(name) => {
                let shown = name.clone();
                self.set_sender_name(name)?;
                match shown {
                    Some(name) => vec![format!("You are now '{}' here", name)],
                    None => vec!["Display name cleared".to_string()],
                }
            }
            Command::Rooms => {
                let lines = view::room_list(&self.store);
                if lines.is_empty() {
                    vec!["(no rooms joined)".to_string()]
                } else {
                    lines
                }
            }
            Command::Users => {
                let name = self.current_room_name()?;
                let room = self.store.room(&name).ok_or(ChatError::NoRoomSelected)?;
                let users = view::room_users(room, self.store.sender_id());
                if users.is_empty() {
                    vec!["(nobody here yet)".to_string()]
                } else {
                    users.iter().map(view::user_line).collect()
                }
            }
            Command::Go(location) => {
                self.go(&location)?;
                self.room_banner()
            }
            Command::Prev => {
                if !self.back() {
                    return Ok(Outcome::Continue(vec!["(no earlier location)".to_string()]));
                }
                self.room_banner()
            }
            Command::Next => {
                if !self.forward() {
                    return Ok(Outcome::Continue(vec!["(no later location)".to_string()]));
                }
                self.room_banner()
            }
            Command::Help => vec![commands::help_text()],
            Command::Quit => return Ok(Outcome::Quit),
        };
        Ok(Outcome::Continue(lines))
    }

    /// Title, location and recent messages of the current room.
    fn room_banner(&self) -> Vec<String> {
        let mut lines = vec![format!("== {} ({}) ==", view::title(&self.store), self.location())];
        if let Some(room) = self.store.current_room() {
            lines.extend(view::history(room, Some(BACKLOG_LINES)));
        }
        lines
    }

    fn latest_id(&self) -> Option<MessageId> {
        self.store
            .current_room()
            .and_then(|room| room.latest())
            .map(|m| m.id)
    }

    /// Messages that reached the current room after `since`, oldest first.
    fn arrived_since(&self, since: Option<MessageId>) -> Vec<String> {
        let Some(room) = self.store.current_room() else {
            return Vec::new();
        };
        let mut lines: Vec<String> = room
            .messages
            .iter()
            .take_while(|m| Some(m.id) != since)
            .map(view::message_line)
            .collect();
        lines.reverse();
        lines
    }

    /// Serve stdin and the transport until `/quit`, end of input, Ctrl-C, or
    /// the transport task going away.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<()> {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        print_lines(&self.room_banner());

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        let since = self.latest_id();
                        self.handle_transport_event(event);
                        print_lines(&self.arrived_since(since));
                    }
                    None => {
                        tracing::warn!("Connection task stopped");
                        break;
                    }
                },
                line = input.next_line() => {
                    let Some(line) = line.context("Failed to read input")? else {
                        break;
                    };
                    let command = match commands::parse(&line) {
                        Ok(Some(command)) => command,
                        Ok(None) => continue,
                        Err(e) => {
                            eprintln!("{}", e);
                            continue;
                        }
                    };
                    match self.execute(command) {
                        Ok(Outcome::Continue(lines)) => print_lines(&lines),
                        Ok(Outcome::Quit) => break,
                        Err(e) => eprintln!("{}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
        }

        tracing::debug!("Leaving chat at {}", self.location());
        Ok(())
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::protocol::{EVENT_MESSAGE, EVENT_NEW_MESSAGE, PHX_JOIN, PHX_LEAVE, PHX_REPLY};
    use crate::channel::ChannelState;
    use crate::storage::MemoryStore;
    use serde_json::{json, Value};

    type TestClient = ChatClient<MemoryStore>;

    fn client() -> (TestClient, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ChatClient::with_store(
            RoomStore::seeded(3),
            Persistence::new(MemoryStore::default()),
            tx,
        );
        (client, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Frame>) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn reply(to: &Frame, status: &str, response: Value) -> TransportEvent {
        TransportEvent::Frame(Frame {
            join_ref: to.join_ref.clone(),
            msg_ref: to.msg_ref.clone(),
            topic: to.topic.clone(),
            event: PHX_REPLY.into(),
            payload: json!({ "status": status, "response": response }),
        })
    }

    fn message(room: &str, id: i64, sender: i64, text: &str) -> TransportEvent {
        TransportEvent::Frame(Frame {
            join_ref: None,
            msg_ref: None,
            topic: format!("room:{}", room),
            event: EVENT_MESSAGE.into(),
            payload: json!({"id": id, "time": 1000, "text": text, "sender_id": sender, "sender_name": "Ann"}),
        })
    }

    /// Acknowledge every pending join with `sender_id`.
    fn ack_joins(client: &mut TestClient, rx: &mut mpsc::UnboundedReceiver<Frame>, sender_id: i64) {
        for frame in drain(rx) {
            if frame.event == PHX_JOIN {
                client.handle_transport_event(reply(&frame, "ok", json!({ "sender_id": sender_id })));
            }
        }
    }

    #[test]
    fn test_select_joins_opens_channel_and_navigates() {
        let (mut client, mut rx) = client();
        client.handle_transport_event(TransportEvent::Connected);
        client.select_room("Lobby 1");

        assert_eq!(client.store().current_room_name(), Some("Lobby 1"));
        assert_eq!(client.location(), "/room/Lobby%201");
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, PHX_JOIN);
        assert_eq!(frames[0].topic, "room:Lobby 1");
    }

    #[test]
    fn test_rooms_joined_offline_join_on_connect() {
        let (mut client, mut rx) = client();
        client.join_room("A");
        client.join_room("B");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(client.channels.state("A"), Some(ChannelState::Unopened));

        client.handle_transport_event(TransportEvent::Connected);
        let joins = drain(&mut rx);
        assert_eq!(joins.iter().filter(|f| f.event == PHX_JOIN).count(), 2);
    }

    #[test]
    fn test_send_policy() {
        let (mut client, mut rx) = client();
        assert!(matches!(client.send_message("hi"), Err(ChatError::NoRoomSelected)));

        client.handle_transport_event(TransportEvent::Connected);
        client.select_room("Lobby");
        assert!(matches!(client.send_message("hi"), Err(ChatError::NotJoined(_))));

        ack_joins(&mut client, &mut rx, 5);
        client.set_sender_name(Some("Ann".into())).unwrap();
        client.send_message("hi").unwrap();
        let pushed = drain(&mut rx);
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].event, EVENT_NEW_MESSAGE);
        assert_eq!(pushed[0].payload, json!({"text": "hi", "sender_name": "Ann"}));

        // Nothing is shown until the server echoes it back.
        assert!(client.store().current_room().unwrap().messages.is_empty());
        client.handle_transport_event(message("Lobby", 1, 5, "hi"));
        let room = client.store().current_room().unwrap();
        assert!(room.messages[0].is_self);
    }

    #[test]
    fn test_leave_closes_channel_and_ignores_stragglers() {
        let (mut client, mut rx) = client();
        client.handle_transport_event(TransportEvent::Connected);
        client.select_room("Lobby");
        ack_joins(&mut client, &mut rx, 5);

        assert_eq!(client.leave_room().unwrap(), "Lobby");
        assert_eq!(client.store().current_room_name(), None);
        assert_eq!(client.location(), "/");
        let leave = drain(&mut rx).pop().unwrap();
        assert_eq!(leave.event, PHX_LEAVE);

        client.handle_transport_event(message("Lobby", 1, 6, "late"));
        assert!(client.store().room("Lobby").is_none());
        client.handle_transport_event(reply(&leave, "ok", json!({})));
        assert_eq!(client.channels.state("Lobby"), None);
        assert!(matches!(client.leave_room(), Err(ChatError::NoRoomSelected)));
    }

    #[test]
    fn test_rejected_join_retried_on_join_intent() {
        let (mut client, mut rx) = client();
        client.handle_transport_event(TransportEvent::Connected);
        client.join_room("Lobby");
        let join = drain(&mut rx).pop().unwrap();
        client.handle_transport_event(reply(&join, "error", json!({"reason": "full"})));
        assert_eq!(client.channels.state("Lobby"), Some(ChannelState::Errored));

        // Unrelated events do not hammer the server with joins.
        client.handle_transport_event(message("Lobby", 1, 6, "hi"));
        assert!(drain(&mut rx).is_empty());

        client.join_room("Lobby");
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(client.channels.state("Lobby"), Some(ChannelState::Joining));
    }

    #[test]
    fn test_reconnect_rejoins_and_may_reassign_sender_id() {
        let (mut client, mut rx) = client();
        client.handle_transport_event(TransportEvent::Connected);
        client.select_room("Lobby");
        ack_joins(&mut client, &mut rx, 5);
        client.handle_transport_event(message("Lobby", 1, 5, "before"));

        client.handle_transport_event(TransportEvent::Disconnected("reset".into()));
        assert_eq!(client.channels.state("Lobby"), Some(ChannelState::Errored));
        client.handle_transport_event(TransportEvent::Connected);
        ack_joins(&mut client, &mut rx, 9);

        assert_eq!(client.store().sender_id(), Some("9"));
        client.handle_transport_event(message("Lobby", 2, 5, "after"));
        let messages = &client.store().current_room().unwrap().messages;
        assert!(!messages[0].is_self);
        assert!(messages[1].is_self);
    }

    #[test]
    fn test_navigation_history_drives_selection() {
        let (mut client, _rx) = client();
        client.select_room("A");
        client.select_room("B");
        assert!(client.back());
        assert_eq!(client.store().current_room_name(), Some("A"));
        assert!(client.back());
        assert_eq!(client.store().current_room_name(), None);
        assert!(!client.back());
        assert!(client.forward());
        assert_eq!(client.store().current_room_name(), Some("A"));

        client.go("/room/New%20Room").unwrap();
        assert_eq!(client.store().current_room_name(), Some("New Room"));
        assert!(client.store().room("New Room").is_some());
        assert_eq!(client.location(), "/room/New%20Room");
    }

    #[test]
    fn test_go_outside_room_paths_keeps_selection_in_sync() {
        let (mut client, _rx) = client();
        client.select_room("Lobby");
        assert!(matches!(
            client.go("/elsewhere"),
            Err(ChatError::UnknownLocation(path)) if path == "/elsewhere"
        ));
        assert_eq!(client.location(), "/room/Lobby");
        assert_eq!(client.store().current_room_name(), Some("Lobby"));

        client.go("/").unwrap();
        assert_eq!(client.location(), "/");
        assert_eq!(client.store().current_room_name(), None);
    }

    #[test]
    fn test_every_change_is_persisted() {
        let (mut client, _rx) = client();
        client.select_room("Lobby");
        client.set_sender_name(Some("Ann".into())).unwrap();

        let restored = client.persistence.load_store();
        assert_eq!(restored.current_room_name(), Some("Lobby"));
        assert_eq!(
            restored.room("Lobby").unwrap().sender_name.as_deref(),
            Some("Ann")
        );
    }

    #[test]
    fn test_rehydrated_rooms_get_channels() {
        let mut saved = Persistence::new(MemoryStore::default());
        let mut store = RoomStore::new();
        store.join_room("Lobby");
        store.select_room("Lobby");
        saved.save_store(&store);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client = ChatClient::new(saved, tx);
        assert_eq!(client.location(), "/room/Lobby");
        assert_eq!(client.channels.state("Lobby"), Some(ChannelState::Unopened));
        client.handle_transport_event(TransportEvent::Connected);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_execute_commands() {
        let (mut client, mut rx) = client();
        client.handle_transport_event(TransportEvent::Connected);

        let Outcome::Continue(lines) = client.execute(Command::Select("Lobby".into())).unwrap() else {
            panic!("expected output");
        };
        assert_eq!(lines, vec!["== Room: Lobby (/room/Lobby) =="]);
        ack_joins(&mut client, &mut rx, 5);

        client.handle_transport_event(message("Lobby", 1, 6, "hello"));
        let Outcome::Continue(lines) = client.execute(Command::Users).unwrap() else {
            panic!("expected output");
        };
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Ann"));

        let Outcome::Continue(lines) = client.execute(Command::Rooms).unwrap() else {
            panic!("expected output");
        };
        assert_eq!(lines, vec!["* Lobby  (1 messages, 1 users)"]);

        assert!(matches!(client.execute(Command::Next), Ok(Outcome::Continue(_))));
        assert_eq!(client.execute(Command::Quit).unwrap(), Outcome::Quit);
    }

    #[test]
    fn test_arrived_since_reports_only_new_messages() {
        let (mut client, mut rx) = client();
        client.handle_transport_event(TransportEvent::Connected);
        client.select_room("Lobby");
        ack_joins(&mut client, &mut rx, 5);
        client.handle_transport_event(message("Lobby", 1, 6, "one"));

        let since = client.latest_id();
        client.handle_transport_event(message("Lobby", 2, 6, "two"));
        client.handle_transport_event(message("Lobby", 3, 6, "three"));
        client.handle_transport_event(message("Lobby", 2, 6, "two"));
        let lines = client.arrived_since(since);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Ann: two"));
        assert!(lines[1].ends_with("Ann: three"));
    }
}
