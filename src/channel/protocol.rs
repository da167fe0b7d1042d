//! Phoenix channel wire format (JSON serializer v2)
//!
//! Every frame is a JSON array `[join_ref, ref, topic, event, payload]`.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";

pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_PRESENCE_STATE: &str = "presence_state";
pub const EVENT_PRESENCE_DIFF: &str = "presence_diff";
pub const EVENT_NEW_MESSAGE: &str = "new_message";

/// Socket-level topic used for heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";
const HEARTBEAT: &str = "heartbeat";

const ROOM_TOPIC_PREFIX: &str = "room:";

pub fn room_topic(room: &str) -> String {
    format!("{}{}", ROOM_TOPIC_PREFIX, room)
}

pub fn topic_room(topic: &str) -> Option<&str> {
    topic.strip_prefix(ROOM_TOPIC_PREFIX)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub join_ref: Option<String>,
    pub msg_ref: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

impl Frame {
    pub fn heartbeat(msg_ref: String) -> Self {
        Self {
            join_ref: None,
            msg_ref: Some(msg_ref),
            topic: PHOENIX_TOPIC.to_string(),
            event: HEARTBEAT.to_string(),
            payload: Value::Object(Default::default()),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::json!([
            self.join_ref,
            self.msg_ref,
            self.topic,
            self.event,
            self.payload
        ])
        .to_string()
    }

    pub fn decode(text: &str) -> Result<Self> {
        let (join_ref, msg_ref, topic, event, payload): (
            Option<String>,
            Option<String>,
            String,
            String,
            Value,
        ) = serde_json::from_str(text).context("Malformed channel frame")?;
        Ok(Self {
            join_ref,
            msg_ref,
            topic,
            event,
            payload,
        })
    }
}

/// Payload of a `phx_reply`.
#[derive(Debug, Deserialize)]
pub struct Reply {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Build the WebSocket endpoint from the server's base URL. `https` servers
/// get `wss`.
pub fn socket_url(server_url: &str, socket_path: &str) -> Result<Url> {
    let mut url =
        Url::parse(server_url).with_context(|| format!("Invalid server URL: {}", server_url))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => bail!("Unsupported server URL scheme: {}", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot use scheme {} for {}", scheme, server_url))?;
    url.set_path(&format!("{}/websocket", socket_path.trim_end_matches('/')));
    url.set_query(Some("vsn=2.0.0"));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_broadcast() {
        let frame = Frame::decode(
            r#"[null,null,"room:Lobby","message",{"id":1,"time":1000,"text":"hi","sender_id":5,"sender_name":"Ann"}]"#,
        )
        .unwrap();
        assert_eq!(frame.join_ref, None);
        assert_eq!(frame.topic, "room:Lobby");
        assert_eq!(frame.event, EVENT_MESSAGE);
        assert_eq!(frame.payload["sender_name"], "Ann");
    }

    #[test]
    fn test_encode_decode_preserves_refs() {
        let frame = Frame {
            join_ref: Some("1".into()),
            msg_ref: Some("2".into()),
            topic: room_topic("Lobby"),
            event: PHX_JOIN.into(),
            payload: serde_json::json!({}),
        };
        assert_eq!(frame.encode(), r#"["1","2","room:Lobby","phx_join",{}]"#);
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Frame::decode("{}").is_err());
        assert!(Frame::decode(r#"["1","2","t"]"#).is_err());
    }

    #[test]
    fn test_heartbeat_frame() {
        let hb = Frame::heartbeat("7".into());
        assert_eq!(hb.encode(), r#"[null,"7","phoenix","heartbeat",{}]"#);
    }

    #[test]
    fn test_room_topic_round_trip() {
        assert_eq!(topic_room(&room_topic("a:b")), Some("a:b"));
        assert_eq!(topic_room("phoenix"), None);
    }

    #[test]
    fn test_socket_url_scheme() {
        let url = socket_url("https://chat.example.com", "/api/socket").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://chat.example.com/api/socket/websocket?vsn=2.0.0"
        );
        let url = socket_url("http://localhost:4000/", "/api/socket/").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:4000/api/socket/websocket?vsn=2.0.0"
        );
        assert!(socket_url("ftp://example.com", "/api/socket").is_err());
        assert!(socket_url("not a url", "/api/socket").is_err());
    }
}
