// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Socket layer: one logical connection to the mirror server.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Controller  │────►│ Connection  │────►│  Transport  │────► server
//! │   (actor)   │◄────│  (events)   │◄────│   (task)    │◄────
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! - Subscription handshake sent once per socket
//! - Stale transports filtered by identity
//! - Immediate reconnect on transport error
//! - Injectable transport trait for testing

mod connection;
mod transport;

pub use connection::{
    websocket_factory, ConnectParams, Connection, ConnectionEvent, LinkEvent,
    SharedConnectionState, TransportFactory, TransportId, STATE_CONNECTED, STATE_CONNECTING,
    STATE_DISCONNECTED,
};
pub use transport::{
    is_reserved_close_code, Transport, TransportError, TransportFuture, TransportResult,
    WebSocketTransport, CLOSE_ABNORMAL, CLOSE_SERVICE_RESTART,
};
