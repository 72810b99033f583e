//! Client side of the relay: forwards session events over a WebSocket
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::Result;
use crate::protocol::Event;

/// How long the link thread blocks on a read before flushing outgoing events
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Destination for events a session emits
pub trait EventSink {
    fn emit(&self, event: &Event);

    fn is_connected(&self) -> bool {
        false
    }

    /// Events pushed to us by the relay since the last call
    fn poll_incoming(&self) -> Vec<Event> {
        Vec::new()
    }
}

/// Standalone mode: every emit is dropped
#[derive(Debug, Default)]
pub struct Offline;

impl EventSink for Offline {
    fn emit(&self, _event: &Event) {}
}

pub struct RelayLink {
    outgoing: Option<Sender<String>>,
    incoming: Receiver<Event>,
    connected: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RelayLink {
    pub fn connect(url: &str) -> Result<Self> {
        let (mut socket, _response) = tungstenite::connect(url)?;
        if let MaybeTlsStream::Plain(stream) = socket.get_mut() {
            stream.set_read_timeout(Some(POLL_INTERVAL))?;
        }
        tracing::info!("Connected to relay at {}", url);

        let (outgoing, outgoing_rx) = channel();
        let (incoming_tx, incoming) = channel();
        let connected = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&connected);
        let handle = thread::spawn(move || {
            pump(socket, outgoing_rx, incoming_tx);
            flag.store(false, Ordering::Relaxed);
        });

        Ok(Self {
            outgoing: Some(outgoing),
            incoming,
            connected,
            handle: Some(handle),
        })
    }
}

impl EventSink for RelayLink {
    fn emit(&self, event: &Event) {
        if !self.is_connected() {
            return;
        }
        let Some(outgoing) = &self.outgoing else {
            return;
        };
        match event.to_json() {
            Ok(text) => {
                let _ = outgoing.send(text);
            }
            Err(e) => tracing::warn!("Failed to encode '{}' event: {}", event.name(), e),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn poll_incoming(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.incoming.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for RelayLink {
    fn drop(&mut self) {
        // Closing the channel tells the pump to say goodbye
        self.outgoing.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn pump(
    mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
    outgoing: Receiver<String>,
    incoming: Sender<Event>,
) {
    loop {
        loop {
            match outgoing.try_recv() {
                Ok(text) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        tracing::warn!("Relay send failed: {}", e);
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    return;
                }
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => match Event::from_json(&text) {
                Ok(event) => {
                    let _ = incoming.send(event);
                }
                Err(e) => tracing::debug!("Ignoring relay frame: {}", e),
            },
            Ok(Message::Close(_)) => {
                tracing::info!("Relay closed the connection");
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::warn!("Relay connection lost: {}", e);
                return;
            }
        }
    }
}
