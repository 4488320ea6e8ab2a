// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! livemirror - companion client for a live therapy session.
//!
//! Mirrors the session running on the desktop over a WebSocket and drives
//! the two-phase partner synchronization through the REST API.
//!
//! # Main Components
//!
//! - [`Controller`] - actor owning the mirror state, driven through a [`ControllerHandle`]
//! - [`socket`] - the single logical socket with its reconnect policy
//! - [`dispatch`] - applies inbound server messages to the state
//! - [`ServerApi`] - REST calls, with [`HttpApi`] as the reqwest implementation
//! - [`UiSink`] - what the controller asks of the user interface
//!
//! ```rust,ignore
//! let (controller, handle) = Controller::new(config, api, ui, websocket_factory());
//! tokio::spawn(controller.run());
//! handle.sign_in("ada@mail.it", "secret").await?;
//! let patient = handle.start_sync().await?;
//! ```

pub mod api;
mod cli;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod persist;
pub mod socket;
pub mod ui;

#[cfg(test)]
mod test_helpers;

pub use api::{ApiError, ApiRequest, ApiResponse, HttpApi, Method, ServerApi};
pub use cli::{describe, run, snapshot_from, AuthArgs, Cli, Command, OutputFormat};
pub use config::Config;
pub use controller::{AppState, ClientState, Controller, ControllerHandle};
pub use error::{Error, Result};
pub use persist::PersistedSnapshot;
pub use socket::{websocket_factory, Connection, TransportFactory};
pub use ui::{ForceSyncReason, PromptUi, TracingUi, UiSink};
