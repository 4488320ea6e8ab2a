// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use lm_core::{
    Card, SessionEvent, SessionKind, SyncDirection, SyncProgress, SyncResult, Tree,
};
use yare::parameterized;

fn active_state(kind: SessionKind) -> MirrorState {
    let mut state = MirrorState::default();
    state
        .session
        .new_session(Some(SessionDescriptor::new("s1", Some("p".into())).with_kind(kind)));
    state.session.load_tree(Tree::new("root", vec![]));
    state
}

fn card(id: &str) -> Card {
    Card {
        id: Some(id.into()),
        label: Some(format!("label {id}")),
        next_page_id: None,
        extra: Default::default(),
    }
}

#[test]
fn search_results_replace_previous() {
    let mut state = MirrorState::default();
    state.search_results = vec![card("old")];
    let effects = dispatch(&mut state, InboundMessage::SearchResults(vec![card("a"), card("b")]));
    assert!(effects.is_empty());
    assert_eq!(state.search_results, vec![card("a"), card("b")]);
}

#[test]
fn card_list_replaces_previous() {
    let mut state = MirrorState::default();
    dispatch(&mut state, InboundMessage::CardList(vec![card("x")]));
    assert_eq!(state.card_list, vec![card("x")]);
    dispatch(&mut state, InboundMessage::CardList(vec![]));
    assert!(state.card_list.is_empty());
}

#[parameterized(
    communication = { SessionKind::CommunicationSession, false },
    cognitive = { SessionKind::CognitiveSession, true },
)]
fn show_page_links_and_hides_labels(kind: SessionKind, hidden: bool) {
    let mut state = active_state(kind);
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));

    let page = state.session.display_page.clone().unwrap();
    assert_eq!(page.labels_hidden, hidden);
    assert_eq!(page.tree_id.as_deref(), Some("root"));
    assert_eq!(state.session.page_history.len(), 1);
}

#[test]
fn show_page_none_clears_display_only() {
    let mut state = active_state(SessionKind::Other);
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));
    dispatch(&mut state, InboundMessage::ShowPage(None));
    assert!(state.session.display_page.is_none());
    assert_eq!(state.session.page_history.len(), 1);
}

#[test]
fn show_end_keeps_history() {
    let mut state = active_state(SessionKind::Other);
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p2"))));
    dispatch(&mut state, InboundMessage::ShowEnd);
    assert!(state.session.display_page.is_none());
    assert_eq!(state.session.page_history.len(), 2);
}

#[test]
fn current_page_opens_unknown_session() {
    let mut state = MirrorState::default();
    dispatch(
        &mut state,
        InboundMessage::CurrentPage {
            session_id: Some("s9".into()),
            patient_id: Some("p".into()),
            page: Some(Page::new("p1")),
        },
    );
    let current = state.session.current.clone().unwrap();
    assert_eq!(current.id, "s9");
    assert_eq!(current.patient_id.as_deref(), Some("p"));
    assert_eq!(state.session.display_page.as_ref().unwrap().id, "p1");
    assert_eq!(state.session.page_history.len(), 1);
    assert!(state.live_view_open);
}

#[test]
fn current_page_keeps_known_session() {
    let mut state = active_state(SessionKind::CognitiveSession);
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));
    dispatch(
        &mut state,
        InboundMessage::CurrentPage {
            session_id: Some("s1".into()),
            patient_id: Some("p".into()),
            page: Some(Page::new("p2")),
        },
    );
    assert_eq!(state.session.tree_stack.len(), 1);
    assert_eq!(state.session.page_history.len(), 2);
    assert!(state.session.display_page.as_ref().unwrap().labels_hidden);
}

#[test]
fn current_page_replacing_session_uses_new_kind() {
    let mut state = active_state(SessionKind::CognitiveSession);
    dispatch(
        &mut state,
        InboundMessage::CurrentPage {
            session_id: Some("other".into()),
            patient_id: None,
            page: Some(Page::new("p1")),
        },
    );
    assert!(state.session.tree_stack.is_empty());
    assert!(!state.session.display_page.as_ref().unwrap().labels_hidden);
}

#[test]
fn current_page_without_session_clears() {
    let mut state = active_state(SessionKind::Other);
    state.live_view_open = true;
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));
    dispatch(
        &mut state,
        InboundMessage::CurrentPage {
            session_id: None,
            patient_id: None,
            page: None,
        },
    );
    assert!(!state.session.is_active());
    assert!(state.session.page_history.is_empty());
    assert!(state.session.tree_stack.is_empty());
    assert!(!state.live_view_open);
}

#[test]
fn no_more_pages_in_nested_tree_posts_jump() {
    let mut state = active_state(SessionKind::Other);
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("a1"))));
    let shown = state.session.display_page.clone();
    state
        .session
        .push_tree(Tree::new("sub", vec![]), shown.as_ref(), None);

    let effects = dispatch(&mut state, InboundMessage::NoMorePages);
    assert_eq!(state.session.tree_stack.len(), 1);
    match effects.as_slice() {
        [Effect::PostEvent(nav)] => {
            assert_eq!(nav.endpoint(), "jump_to_page_events");
            assert_eq!(
                nav.event,
                SessionEvent::JumpToPage {
                    next_page_id: Some("a1".into())
                }
            );
        }
        other => unreachable!("unexpected effects {other:?}"),
    }
}

#[test]
fn no_more_pages_at_root_posts_transition() {
    let mut state = active_state(SessionKind::Other);
    let effects = dispatch(&mut state, InboundMessage::NoMorePages);
    assert!(state.session.tree_stack.is_empty());
    assert_eq!(effects.len(), 1);
    assert!(matches!(&effects[0], Effect::PostEvent(nav) if nav.endpoint() == "transition_to_end_events"));
}

#[test]
fn no_more_pages_without_session_posts_nothing() {
    let mut state = MirrorState::default();
    assert!(dispatch(&mut state, InboundMessage::NoMorePages).is_empty());
}

#[test]
fn unauthorized_result_asks_for_login() {
    let mut state = MirrorState::default();
    state.sync.begin();
    let result = SyncResult::new(SyncDirection::Up, false).with_code("401");
    let effects = dispatch(&mut state, InboundMessage::SynchronizationResult(result));
    assert_eq!(effects, vec![Effect::LoginPrompt]);
    assert_eq!(state.sync.progress(), Some(SyncProgress::default()));
}

#[test]
fn unauthorized_frame_without_direction_asks_for_login() {
    let mut state = MirrorState::default();
    let effects = dispatch_frame(
        &mut state,
        r#"{"message":{"type":"SYNCHRONIZATION_RESULT","code":"401"}}"#,
    );
    assert_eq!(effects, vec![Effect::LoginPrompt]);
}

#[test]
fn sync_results_in_either_order_finish_once() {
    let up = InboundMessage::SynchronizationResult(SyncResult::new(SyncDirection::Up, true));
    let down = InboundMessage::SynchronizationResult(SyncResult::new(SyncDirection::Down, true));

    for order in [[up.clone(), down.clone()], [down, up]] {
        let mut state = MirrorState::default();
        state.sync.begin();
        let effects: Vec<Effect> = order
            .into_iter()
            .flat_map(|msg| dispatch(&mut state, msg))
            .collect();
        assert_eq!(effects, vec![Effect::SyncFinished]);
    }
}

#[test]
fn upload_failure_prompts_and_finishes() {
    let mut state = MirrorState::default();
    state.sync.begin();
    let effects = dispatch(
        &mut state,
        InboundMessage::SynchronizationResult(SyncResult::new(SyncDirection::Up, false)),
    );
    assert_eq!(
        effects,
        vec![Effect::ForceSync(ForceSyncReason::Upload), Effect::SyncFinished]
    );
}

#[test]
fn gaze_toggles() {
    let mut state = MirrorState::default();
    assert!(state.gaze_enabled);
    dispatch(&mut state, InboundMessage::GazeOff);
    assert!(!state.gaze_enabled);
    dispatch(&mut state, InboundMessage::GazeOn);
    assert!(state.gaze_enabled);
}

#[test]
fn video_flag_follows_play_and_end() {
    let mut state = MirrorState::default();
    dispatch(
        &mut state,
        InboundMessage::PlayVideo {
            card_id: "c7".into(),
        },
    );
    assert_eq!(state.session.card_video_playing.as_deref(), Some("c7"));
    dispatch(&mut state, InboundMessage::EndVideo);
    assert!(state.session.card_video_playing.is_none());
}

#[test]
fn last_client_literal_and_object_reset_alike() {
    let mut state = MirrorState::default();
    let literal = dispatch_frame(&mut state, r#"{"message":"{\"type\":\"LAST_CLIENT\"}"}"#);
    let object = dispatch_frame(&mut state, r#"{"message":{"type":"LAST_CLIENT"}}"#);
    assert_eq!(literal, vec![Effect::ResetNavigation]);
    assert_eq!(literal, object);
}

#[test]
fn end_session_tears_down() {
    let mut state = active_state(SessionKind::Other);
    state.live_view_open = true;
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));
    dispatch(&mut state, InboundMessage::EndSession);
    assert!(!state.session.is_active());
    assert!(state.session.page_history.is_empty());
    assert!(state.session.tree_stack.is_empty());
    assert!(!state.live_view_open);
}

#[test]
fn unknown_and_undecodable_frames_change_nothing() {
    let mut state = active_state(SessionKind::Other);
    let before = state.clone();
    assert!(dispatch_frame(&mut state, r#"{"message":{"type":"SOMETHING_NEW"}}"#).is_empty());
    assert!(dispatch_frame(&mut state, "{not json").is_empty());
    assert!(dispatch_frame(&mut state, r#"{"type":"ping","message":1700000000}"#).is_empty());
    assert_eq!(state, before);
}

#[test]
fn page_after_back_shuffle_is_handed_to_ui() {
    let mut state = active_state(SessionKind::Other);
    dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));
    dispatch(&mut state, InboundMessage::ShowEnd);

    assert!(matches!(
        state.session.request_shuffle(),
        lm_core::ShuffleStep::BackFirst(_)
    ));
    let effects = dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p1"))));
    assert!(matches!(effects.as_slice(), [Effect::ShufflePage(p)] if p.id == "p1"));
    assert!(!state.session.flag_back_shuffle_event);

    let effects = dispatch(&mut state, InboundMessage::ShowPage(Some(Page::new("p2"))));
    assert!(effects.is_empty());
}
