use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use slotboard_common::LiveMessage;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::{ChannelDecodeError, TransportError};

/// Capacity of the raw-message stream. Slow subscribers lag, they never block.
const RAW_STREAM_CAPACITY: usize = 64;

/// Abstraction over the push connection for testability.
/// Real implementation: `client::WsTransport`.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;

    async fn connect(&self) -> Result<Box<dyn LiveConnection>, TransportError>;
}

/// An open push connection.
#[async_trait]
pub trait LiveConnection: Send {
    /// Next inbound text frame; `None` once the peer has closed.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn send(&mut self, text: String) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub raw: serde_json::Value,
    /// Present when the payload is one of the backend's known messages.
    pub message: Option<LiveMessage>,
}

/// Push channel: tracks connection state and turns every decodable frame into
/// an invalidation signal.
///
/// The channel never reconnects on its own; callers run [`run`](Self::run)
/// again under whatever policy they choose.
pub struct LiveChannel {
    state: watch::Sender<ConnectionState>,
    last: watch::Sender<Option<LiveUpdate>>,
    invalidations: watch::Sender<u64>,
    raw: broadcast::Sender<LiveUpdate>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Default for LiveChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveChannel {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (last, _) = watch::channel(None);
        let (invalidations, _) = watch::channel(0);
        let (raw, _) = broadcast::channel(RAW_STREAM_CAPACITY);
        Self {
            state,
            last,
            invalidations,
            raw,
            outbound: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Most recently decoded message.
    pub fn last_message(&self) -> Option<LiveUpdate> {
        self.last.borrow().clone()
    }

    /// Ticks once per decoded message. Bursts coalesce.
    pub fn invalidations(&self) -> watch::Receiver<u64> {
        self.invalidations.subscribe()
    }

    /// Every decoded message, for consumers that want more than "refetch".
    pub fn subscribe_raw(&self) -> broadcast::Receiver<LiveUpdate> {
        self.raw.subscribe()
    }

    /// Best-effort send. Returns `false` when the message was dropped because
    /// the channel is not connected; nothing is queued for later.
    pub fn send<T: Serialize>(&self, message: &T) -> bool {
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            debug!("Dropping outbound live message while disconnected");
            return false;
        };
        match serde_json::to_string(message) {
            Ok(text) => tx.send(text).is_ok(),
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound live message");
                false
            }
        }
    }

    /// Decode one inbound frame. Undecodable frames are logged and dropped
    /// without touching the connection state.
    pub fn ingest(&self, frame: &str) -> Result<(), ChannelDecodeError> {
        let raw: serde_json::Value = match serde_json::from_str(frame) {
            Ok(raw) => raw,
            Err(source) => {
                let err = ChannelDecodeError {
                    len: frame.len(),
                    source,
                };
                warn!(error = %err, "Dropping live-update frame");
                return Err(err);
            }
        };
        let message = serde_json::from_value::<LiveMessage>(raw.clone()).ok();
        debug!(typed = message.is_some(), "Live update received");

        let update = LiveUpdate { raw, message };
        self.last.send_replace(Some(update.clone()));
        let _ = self.raw.send(update);
        self.invalidations.send_modify(|n| *n += 1);
        Ok(())
    }

    /// Connect once and pump frames until the connection ends.
    ///
    /// Returns `Ok(())` when the peer closed cleanly. Either way the state is
    /// `Disconnected` on return.
    pub async fn run(&self, transport: &dyn LiveTransport) -> Result<(), TransportError> {
        let endpoint = transport.endpoint();
        self.state.send_replace(ConnectionState::Connecting);
        debug!(%endpoint, "Connecting live-update channel");

        let mut conn = match transport.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let (tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.state.send_replace(ConnectionState::Connected);
        info!(%endpoint, "Live-update channel connected");

        let result = loop {
            tokio::select! {
                frame = conn.recv() => match frame {
                    Some(Ok(text)) => {
                        let _ = self.ingest(&text);
                    }
                    Some(Err(e)) => break Err(e),
                    None => break Ok(()),
                },
                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = conn.send(text).await {
                        break Err(e);
                    }
                }
            }
        };

        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.state.send_replace(ConnectionState::Disconnected);
        match &result {
            Ok(()) => info!(%endpoint, "Live-update channel closed"),
            Err(e) => warn!(%endpoint, error = %e, "Live-update channel lost"),
        }
        result
    }
}
