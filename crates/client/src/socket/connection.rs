// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle for the mirror socket.
//!
//! A [`Connection`] owns at most one live transport. Each transport runs in a
//! background task that reports [`ConnectionEvent`]s tagged with its
//! [`TransportId`]; the owner feeds them back through
//! [`Connection::handle_event`], which drops events from transports that
//! are no longer the active one.
//!
//! On a transport error the socket is closed with 1006 and, when
//! `reconnect_on_error` is set, reopened right away with the same
//! parameters. There is no backoff and no attempt cap.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use lm_core::ClientMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::{Transport, WebSocketTransport, CLOSE_ABNORMAL, CLOSE_SERVICE_RESTART};

/// Connection state values for atomic state field.
pub const STATE_DISCONNECTED: u8 = 0;
pub const STATE_CONNECTING: u8 = 1;
pub const STATE_CONNECTED: u8 = 2;

/// Liveness of one transport, shared with its background task.
///
/// Uses an atomic field for lock-free reads.
#[derive(Debug)]
pub struct SharedConnectionState {
    state: AtomicU8,
}

impl SharedConnectionState {
    /// Create a new shared state initialized to disconnected.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_DISCONNECTED),
        }
    }

    pub fn get(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    pub fn set(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.get() == STATE_CONNECTED
    }

    pub fn is_connecting(&self) -> bool {
        self.get() == STATE_CONNECTING
    }

    /// Get a human-readable status string.
    pub fn status_string(&self) -> &'static str {
        match self.get() {
            STATE_DISCONNECTED => "disconnected",
            STATE_CONNECTING => "connecting",
            STATE_CONNECTED => "connected",
            _ => "unknown",
        }
    }
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Events sent from a transport task to the connection owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connected and subscribed.
    Opened(TransportId),
    /// A text frame arrived.
    Frame(TransportId, String),
    /// The server closed the socket.
    Closed(TransportId),
    /// The transport failed to connect, send or receive.
    Failed(TransportId, String),
}

impl ConnectionEvent {
    pub fn transport_id(&self) -> TransportId {
        match self {
            ConnectionEvent::Opened(id)
            | ConnectionEvent::Frame(id, _)
            | ConnectionEvent::Closed(id)
            | ConnectionEvent::Failed(id, _) => *id,
        }
    }
}

/// What an accepted event means for the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Frame(String),
    /// The live socket is gone; `reconnecting` when a new one is on its way.
    Lost { reconnecting: bool },
}

/// Parameters reused for every (re)connection.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub url: String,
    /// Sent once as the first outbound frame.
    pub subscription: ClientMessage,
    pub reconnect_on_error: bool,
}

/// Builds a fresh transport for every connection attempt.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Factory for real WebSocket transports.
pub fn websocket_factory() -> TransportFactory {
    Arc::new(|| Box::new(WebSocketTransport::new()))
}

/// Channel capacity for connection events.
const EVENT_CHANNEL_SIZE: usize = 64;

enum Outbound {
    Message(ClientMessage),
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

struct ActiveTransport {
    id: TransportId,
    state: Arc<SharedConnectionState>,
    outbound: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
}

/// The single logical socket to the server.
pub struct Connection {
    params: Option<ConnectParams>,
    factory: TransportFactory,
    events: mpsc::Sender<ConnectionEvent>,
    active: Option<ActiveTransport>,
    next_id: u64,
}

impl Connection {
    /// Create a connection using `factory` for transports.
    ///
    /// Returns the connection and the receiver its events arrive on.
    pub fn new(factory: TransportFactory) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let connection = Connection {
            params: None,
            factory,
            events,
            active: None,
            next_id: 0,
        };
        (connection, event_rx)
    }

    /// Create a connection backed by real WebSockets.
    pub fn websocket() -> (Self, mpsc::Receiver<ConnectionEvent>) {
        Self::new(websocket_factory())
    }

    /// Id of the active transport, if any.
    pub fn active_id(&self) -> Option<TransportId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// True if `id` is the active transport.
    pub fn is_current(&self, id: TransportId) -> bool {
        self.active_id() == Some(id)
    }

    /// True if no transport exists or it is not open.
    pub fn is_closed(&self) -> bool {
        !matches!(&self.active, Some(a) if a.state.is_connected())
    }

    pub fn status(&self) -> &'static str {
        self.active
            .as_ref()
            .map_or("disconnected", |a| a.state.status_string())
    }

    /// Opens a socket with new parameters, replacing any previous one.
    pub fn open_with(&mut self, params: ConnectParams) {
        self.params = Some(params);
        self.open();
    }

    /// Opens a socket with the last parameters.
    ///
    /// A no-op while an attempt is in progress. A previous socket is closed
    /// with 1012 first.
    pub fn open(&mut self) {
        let Some(params) = self.params.clone() else {
            warn!("open requested before any connection parameters were set");
            return;
        };
        if let Some(active) = &self.active {
            if active.state.is_connecting() {
                info!(transport = %active.id, "connection attempt already in progress");
                return;
            }
            self.close(Some(CLOSE_SERVICE_RESTART), None);
        }

        self.next_id += 1;
        let id = TransportId(self.next_id);
        let state = Arc::new(SharedConnectionState::new());
        state.set(STATE_CONNECTING);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!(transport = %id, url = %redact(&params.url), "opening socket");
        tokio::spawn(run_transport(
            id,
            (self.factory)(),
            params,
            Arc::clone(&state),
            outbound_rx,
            cancel.clone(),
            self.events.clone(),
        ));

        self.active = Some(ActiveTransport {
            id,
            state,
            outbound,
            cancel,
        });
    }

    /// Sends a message if the socket is open; drops it otherwise.
    pub fn send(&self, msg: ClientMessage) {
        match &self.active {
            Some(active) if active.state.is_connected() => {
                let _ = active.outbound.send(Outbound::Message(msg));
            }
            _ => debug!("socket not open, message dropped"),
        }
    }

    /// Closes the socket. Safe to call when already closed.
    pub fn close(&mut self, code: Option<u16>, reason: Option<String>) {
        let Some(active) = self.active.take() else {
            return;
        };
        debug!(transport = %active.id, ?code, "closing socket");
        active.state.set(STATE_DISCONNECTED);
        let _ = active.outbound.send(Outbound::Close { code, reason });
        active.cancel.cancel();
    }

    /// Filters an event from a transport task and applies the failure policy.
    ///
    /// Returns `None` for events of stale transports.
    pub fn handle_event(&mut self, event: ConnectionEvent) -> Option<LinkEvent> {
        let id = event.transport_id();
        if !self.is_current(id) {
            debug!(transport = %id, "event from stale transport ignored");
            return None;
        }

        match event {
            ConnectionEvent::Opened(_) => {
                info!(transport = %id, "socket open");
                Some(LinkEvent::Opened)
            }
            ConnectionEvent::Frame(_, text) => Some(LinkEvent::Frame(text)),
            ConnectionEvent::Closed(_) => {
                info!(transport = %id, "socket closed by server");
                self.close(None, None);
                Some(LinkEvent::Lost {
                    reconnecting: false,
                })
            }
            ConnectionEvent::Failed(_, error) => {
                warn!(transport = %id, %error, "socket error");
                self.close(Some(CLOSE_ABNORMAL), None);
                let reconnecting = self
                    .params
                    .as_ref()
                    .is_some_and(|p| p.reconnect_on_error);
                if reconnecting {
                    self.open();
                }
                Some(LinkEvent::Lost { reconnecting })
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close(None, None);
    }
}

/// Hides credentials carried in the query string.
fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

async fn run_transport(
    id: TransportId,
    mut transport: Box<dyn Transport>,
    params: ConnectParams,
    state: Arc<SharedConnectionState>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    cancel: CancellationToken,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            return;
        }
        result = transport.connect(&params.url) => result,
    };
    if let Err(e) = connected {
        state.set(STATE_DISCONNECTED);
        let _ = events.send(ConnectionEvent::Failed(id, e.to_string())).await;
        return;
    }

    if let Err(e) = transport.send(params.subscription).await {
        state.set(STATE_DISCONNECTED);
        let _ = events.send(ConnectionEvent::Failed(id, e.to_string())).await;
        return;
    }
    if cancel.is_cancelled() {
        let _ = transport.close(None, None).await;
        return;
    }
    state.set(STATE_CONNECTED);
    let _ = events.send(ConnectionEvent::Opened(id)).await;

    loop {
        tokio::select! {
            biased;

            cmd = outbound.recv() => match cmd {
                Some(Outbound::Message(msg)) => {
                    if let Err(e) = transport.send(msg).await {
                        state.set(STATE_DISCONNECTED);
                        let _ = events.send(ConnectionEvent::Failed(id, e.to_string())).await;
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let _ = transport.close(code, reason).await;
                    return;
                }
                None => {
                    let _ = transport.close(None, None).await;
                    return;
                }
            },
            _ = cancel.cancelled() => {
                let _ = transport.close(None, None).await;
                return;
            }
            frame = transport.recv() => match frame {
                Ok(Some(text)) => {
                    let _ = events.send(ConnectionEvent::Frame(id, text)).await;
                }
                Ok(None) => {
                    state.set(STATE_DISCONNECTED);
                    let _ = events.send(ConnectionEvent::Closed(id)).await;
                    return;
                }
                Err(e) => {
                    state.set(STATE_DISCONNECTED);
                    let _ = events.send(ConnectionEvent::Failed(id, e.to_string())).await;
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
