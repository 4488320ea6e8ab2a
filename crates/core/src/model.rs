// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Data model shared by the mirror client: cards, pages, trees, sessions,
//! partners and synchronization records.
//!
//! The desktop server owns most of these shapes, so every entity keeps the
//! fields it does not interpret in an `extra` map and serializes them back
//! unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Identifier of the shared guest partner. Guests never synchronize.
pub const GUEST_PATIENT_ID: &str = "guestPatient";

/// A selectable tile on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Page reached when the card is selected, if it links anywhere.
    #[serde(
        default,
        deserialize_with = "de_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_page_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single screen of cards mirrored from the desktop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub cards: Vec<Card>,
    /// Id of the tree that was on top of the stack when the page was shown.
    #[serde(rename = "treeId", default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    /// Unique instance id of that tree occurrence.
    #[serde(rename = "treeUID", default, skip_serializing_if = "Option::is_none")]
    pub tree_uid: Option<String>,
    /// Display-only flag: the mirrored view must not render card labels.
    #[serde(rename = "labelsHidden", default, skip_serializing_if = "is_false")]
    pub labels_hidden: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Page {
    /// Creates an empty page with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Page {
            id: id.into(),
            level: 0,
            cards: Vec::new(),
            tree_id: None,
            tree_uid: None,
            labels_hidden: false,
            extra: Map::new(),
        }
    }

    /// Label to render for a card of this page, honoring `labels_hidden`.
    pub fn visible_label<'a>(&self, card: &'a Card) -> Option<&'a str> {
        if self.labels_hidden {
            None
        } else {
            card.label.as_deref()
        }
    }
}

/// A nested flow of linked pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tree {
    /// Creates a tree with the given id and pages.
    pub fn new(id: impl Into<String>, pages: Vec<Page>) -> Self {
        Tree {
            id: id.into(),
            pages,
            extra: Map::new(),
        }
    }
}

/// One occurrence of a tree on the navigation stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeFrame {
    pub tree_id: String,
    /// Distinguishes repeated pushes of the same tree.
    pub uid: String,
    /// Page to resume at when this tree becomes the top again.
    pub last_shown_page_id: Option<String>,
}

/// Kind of session run by the desktop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    CommunicationSession,
    CognitiveSession,
    LearningSession,
    CalibrationSession,
    #[default]
    #[serde(other)]
    Other,
}

/// The active session descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub patient_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: SessionKind,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionDescriptor {
    /// Creates a descriptor of unknown kind, as recovered from a realignment.
    pub fn new(id: impl Into<String>, patient_id: Option<String>) -> Self {
        SessionDescriptor {
            id: id.into(),
            patient_id,
            kind: SessionKind::Other,
            extra: Map::new(),
        }
    }

    /// Returns a copy with the given kind.
    pub fn with_kind(mut self, kind: SessionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_cognitive(&self) -> bool {
        self.kind == SessionKind::CognitiveSession
    }
}

/// The partner the app content is curated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Patient {
    pub fn new(id: impl Into<String>) -> Self {
        Patient {
            id: id.into(),
            extra: Map::new(),
        }
    }

    /// Guests bypass every synchronization check.
    pub fn is_guest(&self) -> bool {
        self.id == GUEST_PATIENT_ID
    }
}

/// The signed-in caregiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Token set returned by the server on sign-in and echoed as request headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "access-token")]
    pub access_token: String,
    pub client: String,
    #[serde(default)]
    pub expiry: String,
    #[serde(rename = "token-type", default)]
    pub token_type: String,
    pub uid: String,
}

impl Credentials {
    /// Header name/value pairs to attach to authenticated requests.
    pub fn headers(&self) -> [(&'static str, &str); 5] {
        [
            ("access-token", self.access_token.as_str()),
            ("client", self.client.as_str()),
            ("expiry", self.expiry.as_str()),
            ("token-type", self.token_type.as_str()),
            ("uid", self.uid.as_str()),
        ]
    }
}

/// Direction of a synchronization leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Up,
    Down,
    /// Recovery of an earlier synchronization that never completed.
    Previous,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One entry of `GET synchronizations`, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub direction: SyncDirection,
    #[serde(default)]
    pub ongoing: bool,
    #[serde(default)]
    pub success: bool,
}

impl SyncRecord {
    pub fn new(direction: SyncDirection, ongoing: bool, success: bool) -> Self {
        SyncRecord {
            direction,
            ongoing,
            success,
        }
    }

    /// Finished and successful.
    pub fn is_settled_ok(&self) -> bool {
        !self.ongoing && self.success
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Server ids are usually strings, but some endpoints emit numbers.
pub(crate) fn id_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(id_from_value))
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    id_from_value(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("expected a string or numeric id"))
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
