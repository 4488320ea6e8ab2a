// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The single state container mutated by the dispatcher and the controller.

use serde::Serialize;

use crate::model::Card;
use crate::session::Session;
use crate::sync::SyncState;

/// Everything the UI observes about the mirror.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorState {
    pub session: Session,
    /// Cards matching the last search on the desktop.
    pub search_results: Vec<Card>,
    /// Secondary card list used by the card picker.
    pub card_list: Vec<Card>,
    pub gaze_enabled: bool,
    /// The live view is mirroring a running session.
    pub live_view_open: bool,
    /// A socket to the server is open and subscribed.
    pub connected: bool,
    pub sync: SyncState,
}

impl Default for MirrorState {
    fn default() -> Self {
        MirrorState {
            session: Session::default(),
            search_results: Vec::new(),
            card_list: Vec::new(),
            gaze_enabled: true,
            live_view_open: false,
            connected: false,
            sync: SyncState::default(),
        }
    }
}

impl MirrorState {
    /// Tears the session down and closes the live view.
    pub fn end_session(&mut self) {
        self.session.new_session(None);
        self.live_view_open = false;
    }
}
