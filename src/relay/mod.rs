//! Event relay - tracks connected sessions and optionally fans messages out.
//!
//! The relay never inspects payloads beyond peeking at the event name for
//! logging; frames are forwarded verbatim.

use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::error::ConfigError;
use crate::protocol::Envelope;

pub mod server;

pub type ClientId = u64;

/// A WebSocket data frame, relayed with its original kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Event name if the payload is shaped like an envelope
    pub fn event_name(&self) -> Option<String> {
        match self {
            Frame::Text(text) => Envelope::peek_name(text),
            Frame::Binary(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(Envelope::peek_name),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Frame::Text(text)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Frame::Binary(bytes)
    }
}

/// Outgoing frames queued for one connected session
pub type SessionSender = mpsc::UnboundedSender<Frame>;

/// Whether received events are rebroadcast to the other sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// Log received events only
    #[default]
    LogOnly,
    /// Forward every received frame to all other sessions
    Broadcast,
}

impl FromStr for RelayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "log-only" => Ok(RelayMode::LogOnly),
            "broadcast" => Ok(RelayMode::Broadcast),
            _ => Err(ConfigError::InvalidRelayMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub message: &'static str,
}

pub struct Relay {
    mode: RelayMode,
    next_id: AtomicU64,
    sessions: Mutex<HashMap<ClientId, SessionSender>>,
}

impl Relay {
    pub fn new(mode: RelayMode) -> Self {
        Self {
            mode,
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<ClientId, SessionSender>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new session and hand back its id
    pub fn on_connect(&self, sender: SessionSender) -> ClientId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions().insert(id, sender);
        tracing::info!("User connected: {}", id);
        id
    }

    pub fn on_disconnect(&self, client: ClientId) {
        if self.sessions().remove(&client).is_some() {
            tracing::info!("User disconnected: {}", client);
        }
    }

    /// Handle one received frame. Returns how many sessions it was forwarded to.
    pub fn on_message(&self, client: ClientId, frame: impl Into<Frame>) -> usize {
        let frame = frame.into();
        match frame.event_name() {
            Some(event) => tracing::debug!("Event '{}' from {}", event, client),
            None => tracing::debug!("Unrecognized frame from {} ({} bytes)", client, frame.len()),
        }

        if self.mode != RelayMode::Broadcast {
            return 0;
        }

        // Snapshot so a session can come or go while we send
        let recipients: Vec<(ClientId, SessionSender)> = self
            .sessions()
            .iter()
            .filter(|(id, _)| **id != client)
            .map(|(&id, sender)| (id, sender.clone()))
            .collect();

        let mut delivered = 0;
        for (id, sender) in recipients {
            if sender.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!("Session {} closed before delivery", id);
            }
        }
        delivered
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    pub fn health(&self) -> Health {
        Health {
            status: "OK",
            message: "Groovebox Server is running!",
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayMode::default())
    }
}
