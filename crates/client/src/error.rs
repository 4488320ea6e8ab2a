// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the livemirror client.

use thiserror::Error;

use crate::api::ApiError;
use crate::socket::TransportError;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] lm_core::Error),

    #[error("not signed in")]
    NotSignedIn,

    #[error("no partner selected")]
    NoPatient,

    #[error("a synchronization is already in progress")]
    SyncInProgress,

    #[error("synchronization still required: {0}")]
    SyncRequired(lm_core::ForceSyncReason),

    #[error("controller stopped")]
    ControllerStopped,

    #[error("{0}")]
    Config(String),
}

/// A specialized Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
