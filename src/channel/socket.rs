//! WebSocket transport: one connection per process, reconnected with backoff.
//!
//! Runs in its own task. Outbound frames arrive over an mpsc channel; decoded
//! inbound frames and connection changes go back as [`TransportEvent`]s.
//! While the socket is down, outbound frames are dropped, not queued.

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::protocol::{Frame, PHOENIX_TOPIC};

const MAX_BACKOFF_SECS: u64 = 64;

#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    Frame(Frame),
    Disconnected(String),
}

/// Reason one connection ended.
enum DisconnectReason {
    /// The engine dropped its sender. Do not reconnect.
    Shutdown,
    /// Error or server-initiated close after a successful connect.
    Error(anyhow::Error),
}

/// Start the transport task for `url`.
pub fn spawn(
    url: Url,
    heartbeat: Duration,
) -> (
    mpsc::UnboundedSender<Frame>,
    mpsc::UnboundedReceiver<TransportEvent>,
) {
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(run(url, heartbeat, frame_rx, event_tx));
    (frame_tx, event_rx)
}

/// Connect, serve, and on failure retry with exponential backoff
/// (1s, 2s, 4s, ... capped at 64s). A connection that got established resets
/// the backoff.
async fn run(
    url: Url,
    heartbeat: Duration,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut backoff = 1u64;

    loop {
        let reason = match run_connection(&url, heartbeat, &mut outbound, &events).await {
            Ok(DisconnectReason::Shutdown) => return,
            Ok(DisconnectReason::Error(e)) => {
                backoff = 1;
                e
            }
            Err(e) => e,
        };

        tracing::warn!("Disconnected: {:#}. Reconnecting in {}s...", reason, backoff);
        if events
            .send(TransportEvent::Disconnected(format!("{:#}", reason)))
            .is_err()
        {
            return;
        }

        let pause = time::sleep(Duration::from_secs(backoff));
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut pause => break,
                frame = outbound.recv() => match frame {
                    Some(frame) => tracing::debug!(
                        "Dropping {} for {} while disconnected",
                        frame.event,
                        frame.topic
                    ),
                    None => return,
                },
            }
        }

        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}

/// Serve one connection until it drops or the engine goes away.
///
/// Returns `Err` only if the connection could not be established.
async fn run_connection(
    url: &Url,
    heartbeat: Duration,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Result<DisconnectReason> {
    tracing::info!("Connecting to {}", url);
    let (mut stream, response) = connect_async(url.as_str())
        .await
        .context("WebSocket connection failed")?;
    tracing::info!("WebSocket connected (status={})", response.status());

    // Anything queued before this point was meant for the old connection.
    while let Ok(frame) = outbound.try_recv() {
        tracing::debug!("Dropping stale {} for {}", frame.event, frame.topic);
    }

    if events.send(TransportEvent::Connected).is_err() {
        return Ok(DisconnectReason::Shutdown);
    }

    let mut ticker = time::interval(heartbeat);
    ticker.tick().await; // skip first immediate tick
    let mut heartbeat_seq = 0u64;
    let mut pending_heartbeat: Option<String> = None;

    let reason = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!("WS recv: {}", text);
                    let frame = match Frame::decode(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("Ignoring frame: {:#}", e);
                            continue;
                        }
                    };
                    if frame.topic == PHOENIX_TOPIC {
                        if frame.msg_ref.is_some() && frame.msg_ref == pending_heartbeat {
                            pending_heartbeat = None;
                        }
                        continue;
                    }
                    if events.send(TransportEvent::Frame(frame)).is_err() {
                        break DisconnectReason::Shutdown;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = stream.send(Message::Pong(data)).await {
                        break DisconnectReason::Error(anyhow::Error::new(e).context("Failed to send pong"));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break DisconnectReason::Error(anyhow!("WebSocket closed by server: {:?}", frame));
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    break DisconnectReason::Error(anyhow::Error::new(e).context("WebSocket receive error"));
                }
                None => {
                    break DisconnectReason::Error(anyhow!("WebSocket closed by server"));
                }
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    let text = frame.encode();
                    tracing::trace!("WS send: {}", text);
                    if let Err(e) = stream.send(Message::Text(text)).await {
                        break DisconnectReason::Error(anyhow::Error::new(e).context("Failed to send frame"));
                    }
                }
                None => {
                    let _ = stream.close(None).await;
                    break DisconnectReason::Shutdown;
                }
            },
            _ = ticker.tick() => {
                if pending_heartbeat.is_some() {
                    break DisconnectReason::Error(anyhow!("Heartbeat timed out"));
                }
                heartbeat_seq += 1;
                let msg_ref = format!("hb{}", heartbeat_seq);
                pending_heartbeat = Some(msg_ref.clone());
                if let Err(e) = stream.send(Message::Text(Frame::heartbeat(msg_ref).encode())).await {
                    break DisconnectReason::Error(anyhow::Error::new(e).context("Heartbeat send failed"));
                }
            }
        }
    };

    Ok(reason)
}
