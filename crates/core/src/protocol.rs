// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Socket protocol between the desktop server and the mirror client.
//!
//! Inbound frames are `{ "message": { "type": ..., ... }, "data": ... }`.
//! The server pushes a fixed vocabulary of message types; everything else is
//! decoded as [`InboundMessage::Unknown`] and ignored by the dispatcher.
//! The only outbound socket frame is the subscription handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{de_opt_id, Card, Page, SyncDirection};

/// Legacy servers send this message as a JSON string instead of an object.
pub const LAST_CLIENT_LITERAL: &str = r#"{"type":"LAST_CLIENT"}"#;

/// Channel the mirror subscribes to.
pub const CABLE_CHANNEL: &str = "CableChannel";

/// Direction of the subscription: the server pushes, the mobile listens.
pub const SERVER_TO_MOBILE: &str = "server_to_mobile";

/// Result of one synchronization leg, pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Absent on `401` results.
    #[serde(default)]
    pub direction: SyncDirection,
    #[serde(default)]
    pub success: bool,
    /// HTTP-like status of the leg; `"401"` means the server lost our session.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub code: Option<String>,
}

impl SyncResult {
    pub fn new(direction: SyncDirection, success: bool) -> Self {
        SyncResult {
            direction,
            success,
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// True when the server asks the user to sign in again.
    pub fn is_unauthorized(&self) -> bool {
        self.code.as_deref() == Some("401")
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `queryres`: card search results.
    SearchResults(Vec<Card>),
    /// `SHOW_PAGE`: the desktop shows a page, or nothing.
    ShowPage(Option<Page>),
    /// `CURRENT_PAGE`: realignment after the app was in background.
    CurrentPage {
        session_id: Option<String>,
        patient_id: Option<String>,
        page: Option<Page>,
    },
    /// `SHOW_END`: the desktop reached the end screen.
    ShowEnd,
    /// `NO_MORE_PAGES`: the top tree has no further pages.
    NoMorePages,
    /// `SYNCHRONIZATION_RESULT`
    SynchronizationResult(SyncResult),
    GazeOn,
    GazeOff,
    /// `cardlistres`: secondary card list.
    CardList(Vec<Card>),
    PlayVideo {
        card_id: String,
    },
    EndVideo,
    /// Another client took over the mirror.
    LastClient,
    EndSession,
    /// Any other `type`; carried for logging only.
    Unknown(String),
}

impl InboundMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &str {
        match self {
            InboundMessage::SearchResults(_) => "queryres",
            InboundMessage::ShowPage(_) => "SHOW_PAGE",
            InboundMessage::CurrentPage { .. } => "CURRENT_PAGE",
            InboundMessage::ShowEnd => "SHOW_END",
            InboundMessage::NoMorePages => "NO_MORE_PAGES",
            InboundMessage::SynchronizationResult(_) => "SYNCHRONIZATION_RESULT",
            InboundMessage::GazeOn => "gazeOn",
            InboundMessage::GazeOff => "gazeOff",
            InboundMessage::CardList(_) => "cardlistres",
            InboundMessage::PlayVideo { .. } => "PLAY_VIDEO",
            InboundMessage::EndVideo => "END_VIDEO",
            InboundMessage::LastClient => "LAST_CLIENT",
            InboundMessage::EndSession => "END_SESSION",
            InboundMessage::Unknown(kind) => kind,
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct VideoRef {
    #[serde(deserialize_with = "crate::model::de_opt_id", default)]
    card_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Body {
    #[serde(rename = "queryres")]
    QueryResult,
    #[serde(rename = "SHOW_PAGE")]
    ShowPage {
        #[serde(default)]
        page: Option<Page>,
    },
    #[serde(rename = "CURRENT_PAGE")]
    CurrentPage {
        #[serde(default, deserialize_with = "de_opt_id")]
        session: Option<String>,
        #[serde(default, deserialize_with = "de_opt_id")]
        patient: Option<String>,
        #[serde(default)]
        page: Option<Page>,
    },
    #[serde(rename = "SHOW_END")]
    ShowEnd,
    #[serde(rename = "NO_MORE_PAGES")]
    NoMorePages,
    #[serde(rename = "SYNCHRONIZATION_RESULT")]
    SynchronizationResult(SyncResult),
    #[serde(rename = "gazeOn")]
    GazeOn,
    #[serde(rename = "gazeOff")]
    GazeOff,
    #[serde(rename = "cardlistres")]
    CardListResult,
    #[serde(rename = "PLAY_VIDEO")]
    PlayVideo { data: VideoRef },
    #[serde(rename = "END_VIDEO")]
    EndVideo,
    #[serde(rename = "LAST_CLIENT")]
    LastClient,
    #[serde(rename = "END_SESSION")]
    EndSession,
    #[serde(other)]
    Unknown,
}

/// Decodes one inbound text frame.
///
/// Returns `Ok(None)` for frames that carry nothing to dispatch (cable
/// welcome, ping and confirmation frames have no object `message`).
pub fn decode_frame(text: &str) -> Result<Option<InboundMessage>> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| Error::MalformedFrame(e.to_string()))?;

    let Some(message) = raw.message.and_then(normalize_message) else {
        return Ok(None);
    };

    let kind = message
        .get("type")
        .and_then(Value::as_str)
        .ok_or(Error::MissingType)?
        .to_string();

    let body: Body = serde_json::from_value(message).map_err(|e| Error::InvalidPayload {
        kind: kind.clone(),
        reason: e.to_string(),
    })?;

    let decoded = match body {
        Body::QueryResult => InboundMessage::SearchResults(cards_from_data(&kind, raw.data)?),
        Body::ShowPage { page } => InboundMessage::ShowPage(page),
        Body::CurrentPage {
            session,
            patient,
            page,
        } => InboundMessage::CurrentPage {
            session_id: session,
            patient_id: patient,
            page,
        },
        Body::ShowEnd => InboundMessage::ShowEnd,
        Body::NoMorePages => InboundMessage::NoMorePages,
        Body::SynchronizationResult(result) => InboundMessage::SynchronizationResult(result),
        Body::GazeOn => InboundMessage::GazeOn,
        Body::GazeOff => InboundMessage::GazeOff,
        Body::CardListResult => InboundMessage::CardList(cards_from_data(&kind, raw.data)?),
        Body::PlayVideo { data } => match data.card_id {
            Some(card_id) => InboundMessage::PlayVideo { card_id },
            None => {
                return Err(Error::InvalidPayload {
                    kind,
                    reason: "missing card_id".to_string(),
                })
            }
        },
        Body::EndVideo => InboundMessage::EndVideo,
        Body::LastClient => InboundMessage::LastClient,
        Body::EndSession => InboundMessage::EndSession,
        Body::Unknown => InboundMessage::Unknown(kind),
    };

    Ok(Some(decoded))
}

/// Compatibility shim: `LAST_CLIENT` may arrive double-encoded as a string.
fn normalize_message(message: Value) -> Option<Value> {
    match message {
        Value::Object(_) => Some(message),
        Value::String(ref s) if s == LAST_CLIENT_LITERAL => serde_json::from_str(s).ok(),
        _ => None,
    }
}

fn cards_from_data(kind: &str, data: Option<Value>) -> Result<Vec<Card>> {
    match data {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value).map_err(|e| Error::InvalidPayload {
            kind: kind.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Identifier of the subscribed channel, sent JSON-encoded inside the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIdentifier {
    pub channel: String,
    pub direction: String,
}

impl ChannelIdentifier {
    /// The one channel the mirror listens on.
    pub fn mirror() -> Self {
        ChannelIdentifier {
            channel: CABLE_CHANNEL.to_string(),
            direction: SERVER_TO_MOBILE.to_string(),
        }
    }
}

/// Messages sent from the client over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a channel; `identifier` is itself a JSON document.
    Subscribe { identifier: String },
}

impl ClientMessage {
    /// Creates the subscription handshake for a channel.
    pub fn subscribe(channel: &ChannelIdentifier) -> Result<Self> {
        Ok(ClientMessage::Subscribe {
            identifier: serde_json::to_string(channel)?,
        })
    }

    /// Creates the handshake for the mirror channel.
    pub fn mirror_subscription() -> Result<Self> {
        Self::subscribe(&ChannelIdentifier::mirror())
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
