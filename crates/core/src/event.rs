// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synthetic session events posted to the server as HTTP records.

use serde::Serialize;

use crate::model::{Page, SessionDescriptor, Tree};

/// Endpoint a tree opened on the mirror is reported to.
pub const LOAD_TREE_EVENTS: &str = "load_tree_events";

/// A navigation event produced by the tree stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SessionEvent {
    /// Resume a parent tree at its last shown page.
    JumpToPage { next_page_id: Option<String> },
    /// The root tree has no more pages: the session reaches its end.
    TransitionToEnd {},
    /// The user walked back to an earlier page.
    Back { next_page_id: Option<String> },
}

impl SessionEvent {
    /// Endpoint the record is posted to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            SessionEvent::JumpToPage { .. } => "jump_to_page_events",
            SessionEvent::TransitionToEnd {} => "transition_to_end_events",
            SessionEvent::Back { .. } => "back_events",
        }
    }
}

/// Body of `POST <endpoint>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub training_session_id: Option<String>,
    pub page_id: Option<String>,
    #[serde(flatten)]
    pub body: SessionEvent,
}

/// An event together with the session context captured before the state
/// transition that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationEvent {
    pub event: SessionEvent,
    pub session: Option<SessionDescriptor>,
    pub page: Option<Page>,
}

impl NavigationEvent {
    pub fn endpoint(&self) -> &'static str {
        self.event.endpoint()
    }

    /// Builds the wire record for this event.
    pub fn record(&self) -> EventRecord {
        EventRecord {
            training_session_id: self.session.as_ref().map(|s| s.id.clone()),
            page_id: self.page.as_ref().map(|p| p.id.clone()),
            body: self.event.clone(),
        }
    }
}

/// Body of `POST load_tree_events`: a tree pushed on the stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeLoadRecord {
    pub training_session_id: Option<String>,
    pub tree: Tree,
}

impl TreeLoadRecord {
    pub fn new(session: Option<&SessionDescriptor>, tree: Tree) -> Self {
        TreeLoadRecord {
            training_session_id: session.map(|s| s.id.clone()),
            tree,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
