// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    jump = { SessionEvent::JumpToPage { next_page_id: None }, "jump_to_page_events" },
    end = { SessionEvent::TransitionToEnd {}, "transition_to_end_events" },
    back = { SessionEvent::Back { next_page_id: Some("p".into()) }, "back_events" },
)]
fn event_endpoints(event: SessionEvent, expected: &str) {
    assert_eq!(event.endpoint(), expected);
}

#[test]
fn record_carries_session_and_page() {
    let nav = NavigationEvent {
        event: SessionEvent::JumpToPage {
            next_page_id: Some("p-9".into()),
        },
        session: Some(SessionDescriptor::new("s-1", None)),
        page: Some(Page::new("p-3")),
    };

    let value = serde_json::to_value(nav.record()).unwrap();
    assert_eq!(
        value,
        json!({
            "training_session_id": "s-1",
            "page_id": "p-3",
            "next_page_id": "p-9"
        })
    );
}

#[test]
fn transition_record_has_only_context() {
    let nav = NavigationEvent {
        event: SessionEvent::TransitionToEnd {},
        session: Some(SessionDescriptor::new("s-1", None)),
        page: None,
    };

    let value = serde_json::to_value(nav.record()).unwrap();
    assert_eq!(
        value,
        json!({ "training_session_id": "s-1", "page_id": null })
    );
}

#[test]
fn tree_load_record_carries_session_and_tree() {
    let session = SessionDescriptor::new("s-1", None);
    let record = TreeLoadRecord::new(Some(&session), Tree::new("t-4", Vec::new()));

    let value = serde_json::to_value(record).unwrap();
    assert_eq!(
        value,
        json!({ "training_session_id": "s-1", "tree": { "id": "t-4", "pages": [] } })
    );
}
