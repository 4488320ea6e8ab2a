// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound message dispatcher.
//!
//! Applies one decoded server message to the mirror state and returns the
//! side effects the controller must carry out. Nothing here performs I/O.

use lm_core::{
    decode_frame, ForceSyncReason, InboundMessage, MirrorState, NavigationEvent, Page,
    SessionDescriptor,
};
use tracing::{debug, info, warn};

/// Side effect requested by a dispatched message.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Post a session event record to the server.
    PostEvent(NavigationEvent),
    /// Open the blocking synchronization prompt.
    ForceSync(ForceSyncReason),
    /// Both synchronization directions completed.
    SyncFinished,
    /// The server rejected our token during a synchronization.
    LoginPrompt,
    /// Another client took over: back to the home screen.
    ResetNavigation,
    /// A page brought back for a shuffle is displayed.
    ShufflePage(Page),
}

/// Decodes a raw text frame and dispatches it.
///
/// Malformed frames are logged and dropped.
pub fn dispatch_frame(state: &mut MirrorState, text: &str) -> Vec<Effect> {
    match decode_frame(text) {
        Ok(Some(msg)) => dispatch(state, msg),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "dropping undecodable frame");
            Vec::new()
        }
    }
}

/// Applies one message to `state`.
pub fn dispatch(state: &mut MirrorState, msg: InboundMessage) -> Vec<Effect> {
    debug!(kind = msg.kind(), "dispatch");
    let mut effects = Vec::new();

    match msg {
        InboundMessage::SearchResults(cards) => state.search_results = cards,
        InboundMessage::ShowPage(page) => {
            let shown = page.is_some();
            state.session.show_page(page);
            if shown {
                shuffle_if_requested(state, &mut effects);
            }
        }
        InboundMessage::CurrentPage {
            session_id,
            patient_id,
            page,
        } => match session_id {
            Some(id) => {
                let known = state
                    .session
                    .current
                    .as_ref()
                    .is_some_and(|current| current.id == id);
                if !known {
                    info!(session_id = %id, "realigning to running session");
                    state
                        .session
                        .new_session(Some(SessionDescriptor::new(id, patient_id)));
                }
                let shown = page.is_some();
                state.session.show_page(page);
                state.live_view_open = true;
                if shown {
                    shuffle_if_requested(state, &mut effects);
                }
            }
            None => {
                info!("no session running on the desktop");
                state.end_session();
            }
        },
        InboundMessage::ShowEnd => state.session.set_display_page(None),
        InboundMessage::NoMorePages => {
            if let Some(nav) = state.session.on_no_more_pages() {
                effects.push(Effect::PostEvent(nav));
            }
        }
        InboundMessage::SynchronizationResult(result) => {
            if result.is_unauthorized() {
                warn!(direction = ?result.direction, "synchronization unauthorized");
                effects.push(Effect::LoginPrompt);
            } else {
                let outcome = state.sync.apply_result(&result);
                if let Some(reason) = outcome.prompt {
                    effects.push(Effect::ForceSync(reason));
                }
                if outcome.finished {
                    effects.push(Effect::SyncFinished);
                }
            }
        }
        InboundMessage::GazeOn => state.gaze_enabled = true,
        InboundMessage::GazeOff => state.gaze_enabled = false,
        InboundMessage::CardList(cards) => state.card_list = cards,
        InboundMessage::PlayVideo { card_id } => state.session.set_card_video_playing(Some(card_id)),
        InboundMessage::EndVideo => state.session.set_card_video_playing(None),
        InboundMessage::LastClient => effects.push(Effect::ResetNavigation),
        InboundMessage::EndSession => {
            info!("session ended by the desktop");
            state.end_session();
        }
        InboundMessage::Unknown(kind) => debug!(%kind, "ignoring unknown message"),
    }

    effects
}

fn shuffle_if_requested(state: &mut MirrorState, effects: &mut Vec<Effect>) {
    if !state.session.take_shuffle_flag() {
        return;
    }
    if let Some(page) = &state.session.display_page {
        effects.push(Effect::ShufflePage(page.clone()));
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
