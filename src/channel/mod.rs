//! Channel manager: one channel per joined room on top of the shared socket.
//!
//! Bridges inbound channel events to a [`ChannelEvents`] sink and user intents
//! to outbound pushes. It does not retry on its own; rejoining happens when the
//! transport reports a fresh connection or when a channel is ensured again.

pub mod protocol;
pub mod socket;

use serde_json::json;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::ChatError;
use crate::models::{
    IncomingMessage, JoinResponse, PresenceDiff, PresenceEvent, PresenceState, UserId,
};
use protocol::{
    room_topic, topic_room, Frame, Reply, EVENT_MESSAGE, EVENT_NEW_MESSAGE, EVENT_PRESENCE_DIFF,
    EVENT_PRESENCE_STATE, PHX_CLOSE, PHX_ERROR, PHX_JOIN, PHX_LEAVE, PHX_REPLY,
};

/// Receiver of decoded channel events, keyed by room name.
///
/// The sink is handed to [`ChannelManager::handle_frame`] per event, so
/// handlers always see current state rather than a snapshot from join time.
pub trait ChannelEvents {
    /// A join was acknowledged; `sender_id` is the identity for this session.
    fn on_joined(&mut self, room: &str, sender_id: Option<UserId>);
    fn on_message(&mut self, room: &str, message: IncomingMessage);
    fn on_presence(&mut self, room: &str, event: PresenceEvent);
}

/// Lifecycle of one room's channel. A closed channel has no entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created while the socket is down; joins on connect.
    Unopened,
    Joining,
    Joined,
    /// Join rejected, server-side crash, or transport drop.
    Errored,
    Leaving,
}

struct Channel {
    topic: String,
    state: ChannelState,
    join_ref: Option<String>,
    leave_ref: Option<String>,
}

pub struct ChannelManager {
    outbound: mpsc::UnboundedSender<Frame>,
    channels: HashMap<String, Channel>,
    connected: bool,
    next_ref: u64,
}

impl ChannelManager {
    pub fn new(outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            outbound,
            channels: HashMap::new(),
            connected: false,
            next_ref: 0,
        }
    }

    pub fn state(&self, room: &str) -> Option<ChannelState> {
        self.channels.get(room).map(|c| c.state)
    }

    /// Rooms with an open (not leaving) channel.
    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.channels
            .iter()
            .filter(|(_, c)| c.state != ChannelState::Leaving)
            .map(|(room, _)| room.as_str())
    }

    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn send(&self, frame: Frame) -> Result<(), ChatError> {
        self.outbound
            .send(frame)
            .map_err(|_| ChatError::TransportClosed)
    }

    /// Make sure `room` has a channel. Existing healthy channels are left
    /// alone; an errored one is joined again.
    pub fn ensure_channel(&mut self, room: &str) {
        match self.channels.get(room).map(|c| c.state) {
            Some(ChannelState::Unopened | ChannelState::Joining | ChannelState::Joined) => return,
            Some(ChannelState::Errored) => {}
            Some(ChannelState::Leaving) | None => {
                self.channels.insert(
                    room.to_owned(),
                    Channel {
                        topic: room_topic(room),
                        state: ChannelState::Unopened,
                        join_ref: None,
                        leave_ref: None,
                    },
                );
            }
        }
        if self.connected {
            self.join(room);
        }
    }

    fn join(&mut self, room: &str) {
        let join_ref = self.make_ref();
        let Some(channel) = self.channels.get_mut(room) else {
            return;
        };
        channel.state = ChannelState::Joining;
        channel.join_ref = Some(join_ref.clone());
        channel.leave_ref = None;
        let frame = Frame {
            join_ref: Some(join_ref.clone()),
            msg_ref: Some(join_ref),
            topic: channel.topic.clone(),
            event: PHX_JOIN.to_string(),
            payload: json!({}),
        };
        tracing::info!("Joining channel {}", frame.topic);
        if let Err(e) = self.send(frame) {
            tracing::warn!("Could not join '{}': {}", room, e);
        }
    }

    /// Leave and discard the channel for `room`. Safe when there is none.
    pub fn close_channel(&mut self, room: &str) {
        let Some(state) = self.state(room) else {
            return;
        };
        let joined = matches!(state, ChannelState::Joining | ChannelState::Joined);
        if !(joined && self.connected) {
            self.channels.remove(room);
            tracing::debug!("Closed channel for '{}'", room);
            return;
        }

        let leave_ref = self.make_ref();
        let Some(channel) = self.channels.get_mut(room) else {
            return;
        };
        channel.state = ChannelState::Leaving;
        channel.leave_ref = Some(leave_ref.clone());
        let frame = Frame {
            join_ref: channel.join_ref.clone(),
            msg_ref: Some(leave_ref),
            topic: channel.topic.clone(),
            event: PHX_LEAVE.to_string(),
            payload: json!({}),
        };
        tracing::info!("Leaving channel {}", frame.topic);
        if self.send(frame).is_err() {
            self.channels.remove(room);
        }
    }

    /// Push a chat message. The server assigns its id and time; nothing is
    /// shown locally until it comes back as a `message` event.
    pub fn send_message(
        &mut self,
        room: &str,
        text: &str,
        sender_name: Option<&str>,
    ) -> Result<(), ChatError> {
        let msg_ref = self.make_ref();
        let channel = self
            .channels
            .get(room)
            .filter(|c| c.state != ChannelState::Leaving)
            .ok_or_else(|| ChatError::NoChannel(room.to_owned()))?;
        if channel.state != ChannelState::Joined {
            return Err(ChatError::NotJoined(room.to_owned()));
        }
        let frame = Frame {
            join_ref: channel.join_ref.clone(),
            msg_ref: Some(msg_ref),
            topic: channel.topic.clone(),
            event: EVENT_NEW_MESSAGE.to_string(),
            payload: json!({ "text": text, "sender_name": sender_name }),
        };
        self.send(frame)
    }

    /// The transport (re)connected: join every channel again.
    pub fn handle_connected(&mut self) {
        self.connected = true;
        self.channels
            .retain(|_, c| c.state != ChannelState::Leaving);
        let rooms: Vec<String> = self.channels.keys().cloned().collect();
        for room in rooms {
            self.join(&room);
        }
    }

    /// The transport dropped: nothing is joined any more.
    pub fn handle_disconnected(&mut self) {
        self.connected = false;
        self.channels
            .retain(|_, c| c.state != ChannelState::Leaving);
        for channel in self.channels.values_mut() {
            if matches!(channel.state, ChannelState::Joining | ChannelState::Joined) {
                channel.state = ChannelState::Errored;
            }
        }
    }

    /// Route one inbound frame. Frames for unknown or closed channels, and
    /// frames from a previous join of the same topic, are ignored.
    pub fn handle_frame(&mut self, frame: Frame, events: &mut dyn ChannelEvents) {
        let Some(room) = topic_room(&frame.topic).map(str::to_owned) else {
            tracing::debug!("Ignoring {} on unknown topic {}", frame.event, frame.topic);
            return;
        };
        let Some(channel) = self.channels.get_mut(&room) else {
            tracing::debug!("Ignoring {} for closed channel {}", frame.event, frame.topic);
            return;
        };
        if frame.join_ref.is_some() && frame.join_ref != channel.join_ref {
            tracing::debug!("Ignoring stale {} for {}", frame.event, frame.topic);
            return;
        }

        match frame.event.as_str() {
            PHX_REPLY => {
                let reply: Reply = match serde_json::from_value(frame.payload) {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::warn!("Malformed reply on {}: {}", frame.topic, e);
                        return;
                    }
                };
                if frame.msg_ref.is_some() && frame.msg_ref == channel.leave_ref {
                    self.channels.remove(&room);
                    tracing::debug!("Closed channel for '{}'", room);
                } else if frame.msg_ref.is_some() && frame.msg_ref == channel.join_ref {
                    if channel.state != ChannelState::Joining {
                        return;
                    }
                    if reply.is_ok() {
                        channel.state = ChannelState::Joined;
                        let sender_id = serde_json::from_value::<JoinResponse>(reply.response)
                            .unwrap_or_default()
                            .sender_id;
                        tracing::info!("Joined channel {}", frame.topic);
                        events.on_joined(&room, sender_id);
                    } else {
                        channel.state = ChannelState::Errored;
                        tracing::warn!(
                            "Server rejected join for '{}': {}",
                            room,
                            reply.response
                        );
                    }
                } else if !reply.is_ok() {
                    tracing::warn!("Server rejected push on '{}': {}", room, reply.response);
                }
            }
            PHX_ERROR => {
                if channel.state != ChannelState::Leaving {
                    tracing::warn!("Channel {} crashed on the server", frame.topic);
                    channel.state = ChannelState::Errored;
                }
            }
            PHX_CLOSE => {
                if channel.state == ChannelState::Leaving {
                    self.channels.remove(&room);
                } else {
                    channel.state = ChannelState::Errored;
                }
            }
            _ if channel.state == ChannelState::Leaving => {
                tracing::debug!("Ignoring {} for leaving channel {}", frame.event, frame.topic);
            }
            EVENT_MESSAGE => match serde_json::from_value::<IncomingMessage>(frame.payload) {
                Ok(message) => events.on_message(&room, message),
                Err(e) => tracing::warn!("Malformed message on {}: {}", frame.topic, e),
            },
            EVENT_PRESENCE_STATE => match serde_json::from_value::<PresenceState>(frame.payload) {
                Ok(state) => events.on_presence(&room, PresenceEvent::State(state)),
                Err(e) => tracing::warn!("Malformed presence state on {}: {}", frame.topic, e),
            },
            EVENT_PRESENCE_DIFF => match serde_json::from_value::<PresenceDiff>(frame.payload) {
                Ok(diff) => events.on_presence(&room, PresenceEvent::Diff(diff)),
                Err(e) => tracing::warn!("Malformed presence diff on {}: {}", frame.topic, e),
            },
            other => tracing::debug!("Unhandled event {} on {}", other, frame.topic),
        }
    }
}
