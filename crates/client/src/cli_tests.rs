// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::api::Method;
use crate::test_helpers::{ok, signed_in, MockApi, MockNetwork};
use lm_core::{Credentials, Page, SessionDescriptor};
use serde_json::json;
use yare::parameterized;

#[parameterized(
    watch_default = { &["livemirror", "watch"], Command::Watch { output: OutputFormat::Text } },
    watch_json = { &["livemirror", "watch", "--output", "json"], Command::Watch { output: OutputFormat::Json } },
    sync = { &["livemirror", "sync"], Command::Sync },
    check = { &["livemirror", "check", "--patient", "7"], Command::Check },
)]
fn parses_commands(args: &[&str], expected: Command) {
    let cli = Cli::try_parse_from(args).unwrap();
    assert_eq!(cli.command, expected);
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "livemirror",
        "sync",
        "--server",
        "http://10.0.2.2:3000",
        "--email",
        "ada@mail.it",
        "--password",
        "pw",
        "-v",
    ])
    .unwrap();
    assert_eq!(cli.server.as_deref(), Some("http://10.0.2.2:3000"));
    assert_eq!(cli.auth.email.as_deref(), Some("ada@mail.it"));
    assert!(cli.verbose);
    assert!(!cli.auth.guest);
}

#[parameterized(
    email_without_password = { &["livemirror", "sync", "--email", "a@b.c"] },
    email_and_guest = { &["livemirror", "sync", "--email", "a@b.c", "--password", "x", "--guest"] },
    missing_command = { &["livemirror"] },
)]
fn rejects_invalid_arguments(args: &[&str]) {
    assert!(Cli::try_parse_from(args).is_err());
}

fn signed_in_state() -> ClientState {
    ClientState {
        credentials: Some(Credentials {
            access_token: "tok".into(),
            client: "cli".into(),
            expiry: "9".into(),
            token_type: "Bearer".into(),
            uid: "ada@mail.it".into(),
        }),
        patient: Some(Patient::new("7")),
        ..ClientState::default()
    }
}

#[test]
fn snapshot_keeps_foreign_fields() {
    let previous = PersistedSnapshot {
        transparency_level: Some(0.4),
        ..PersistedSnapshot::default()
    };
    let snapshot = snapshot_from(&signed_in_state(), &Config::default(), &previous);

    assert!(snapshot.logged_in);
    assert_eq!(snapshot.restorable().unwrap().access_token, "tok");
    assert_eq!(snapshot.current_patient.unwrap().id, "7");
    assert_eq!(snapshot.server_url.as_deref(), Some("http://localhost:3000"));
    assert_eq!(snapshot.transparency_level, Some(0.4));
}

#[test]
fn snapshot_after_sign_out_is_not_restorable() {
    let snapshot = snapshot_from(
        &ClientState::default(),
        &Config::default(),
        &PersistedSnapshot::default(),
    );
    assert!(!snapshot.logged_in);
    assert!(snapshot.restorable().is_none());
}

#[test]
fn describe_idle_state() {
    assert_eq!(
        describe(&ClientState::default()),
        "offline | no session | page - | history 0"
    );
}

#[test]
fn describe_live_session() {
    let mut state = signed_in_state();
    state.mirror.connected = true;
    state.mirror.gaze_enabled = false;
    state
        .mirror
        .session
        .new_session(Some(SessionDescriptor::new("31", None)));
    state.mirror.session.show_page(Some(Page::new("home")));
    state.mirror.sync.begin();

    assert_eq!(
        describe(&state),
        "online | session 31 | page home | history 1 | synchronizing | gaze off"
    );
}

const QUEUED: &str = "patients/7/queued_synchronizables";

async fn unattended() -> (
    ControllerHandle,
    mpsc::UnboundedReceiver<ForceSyncReason>,
    Arc<MockApi>,
) {
    let api = MockApi::new();
    let net = MockNetwork::new();
    let (ui, prompts) = PromptUi::new();
    let (controller, handle) =
        Controller::new(Config::default(), api.clone(), Arc::new(ui), net.factory());
    tokio::spawn(controller.run());

    api.respond(Method::Post, "sign_in", signed_in("ada@mail.it", "tok"));
    handle.sign_in("ada@mail.it", "pw").await.unwrap();
    handle.select_patient(Patient::new("7")).await.unwrap();
    api.always(Method::Post, "synchronizations", ok(json!({})));
    api.always(
        Method::Get,
        "synchronizations",
        ok(json!([
            { "direction": "down", "ongoing": false, "success": true },
            { "direction": "up", "ongoing": false, "success": true },
        ])),
    );
    (handle, prompts, api)
}

#[tokio::test]
async fn check_retries_queued_objects_until_clear() {
    let (handle, mut prompts, api) = unattended().await;
    api.respond(Method::Get, QUEUED, ok(json!([{ "id": 1 }])));
    api.respond(Method::Get, QUEUED, ok(json!([])));

    let patient = answer_prompts(
        &handle,
        &mut prompts,
        handle.check_queued_sync(Patient::new("7")),
    )
    .await
    .unwrap();
    assert_eq!(patient.id, "7");
    assert_eq!(api.requests_to(Method::Post, "synchronizations").len(), 1);
}

#[tokio::test]
async fn check_gives_up_on_objects_that_stay_queued() {
    let (handle, mut prompts, api) = unattended().await;
    api.always(Method::Get, QUEUED, ok(json!([{ "id": 1 }])));

    let err = answer_prompts(
        &handle,
        &mut prompts,
        handle.check_queued_sync(Patient::new("7")),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        Error::SyncRequired(ForceSyncReason::PendingObjects)
    ));
    assert_eq!(
        api.requests_to(Method::Post, "synchronizations").len(),
        PROMPT_RETRIES
    );
}
