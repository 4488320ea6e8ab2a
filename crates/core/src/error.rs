// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for lm-core operations.

use thiserror::Error;

/// Errors raised while decoding or validating mirror data.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("message has no type discriminator")]
    MissingType,

    #[error("invalid payload for {kind}: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for lm-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
