// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lm_core::{ForceSyncReason, Patient};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::HttpApi;
use crate::config::Config;
use crate::controller::{ClientState, Controller, ControllerHandle};
use crate::error::{Error, Result};
use crate::persist::PersistedSnapshot;
use crate::socket::websocket_factory;
use crate::ui::PromptUi;

/// Retries granted to a forced-synchronization prompt before giving up.
const PROMPT_RETRIES: usize = 3;

/// Output format for `watch`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "livemirror")]
#[command(version, about = "Mirror a running therapy session and keep its partner synchronized")]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Persisted sign-in state (defaults to the user data directory)
    #[arg(long, global = true)]
    pub state: Option<PathBuf>,

    /// Server url, overriding the config file
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Partner to work with instead of the stored one
    #[arg(long, global = true)]
    pub patient: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// How to sign in. Without flags the stored credentials are reused.
#[derive(Args, Debug, Default, Clone)]
pub struct AuthArgs {
    #[arg(long, global = true, requires = "password", conflicts_with = "guest")]
    pub email: Option<String>,

    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Use the shared guest account
    #[arg(long, global = true)]
    pub guest: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Follow the live session until interrupted
    Watch {
        #[arg(long, value_enum, default_value_t)]
        output: OutputFormat,
    },
    /// Synchronize the partner with the desktop
    Sync,
    /// Wait until the partner has no objects queued for synchronization
    Check,
}

/// Runs one command against the server.
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().or_else(Config::default_path);
    let mut config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }

    let state_path = cli.state.clone().or_else(PersistedSnapshot::default_path);
    let previous = match &state_path {
        Some(path) => PersistedSnapshot::load(path)?,
        None => PersistedSnapshot::default(),
    };

    let api = Arc::new(HttpApi::new(&config)?);
    let (ui, mut prompts) = PromptUi::new();
    let (controller, handle) =
        Controller::new(config.clone(), api, Arc::new(ui), websocket_factory());
    let task = tokio::spawn(controller.run());

    let signed_in = sign_in(&handle, &cli.auth, &previous).await;
    if let Some(path) = &state_path {
        save_snapshot(path, &snapshot_from(&handle.state(), &config, &previous));
    }
    signed_in?;

    if let Some(id) = &cli.patient {
        handle.select_patient(Patient::new(id.as_str())).await?;
    }

    let outcome = match cli.command {
        Command::Watch { output } => watch(&handle, output).await,
        Command::Sync => answer_prompts(&handle, &mut prompts, handle.start_sync())
            .await
            .map(|patient| info!(patient_id = %patient.id, "synchronization finished")),
        Command::Check => match handle.state().patient {
            Some(patient) => {
                answer_prompts(&handle, &mut prompts, handle.check_queued_sync(patient))
                    .await
                    .map(|patient| info!(patient_id = %patient.id, "nothing left to synchronize"))
            }
            None => Err(Error::NoPatient),
        },
    };

    if let Some(path) = &state_path {
        save_snapshot(path, &snapshot_from(&handle.state(), &config, &previous));
    }
    drop(handle);
    let _ = task.await;
    outcome
}

async fn sign_in(
    handle: &ControllerHandle,
    auth: &AuthArgs,
    previous: &PersistedSnapshot,
) -> Result<()> {
    if auth.guest {
        handle.sign_in_guest().await?;
        return Ok(());
    }
    if let (Some(email), Some(password)) = (&auth.email, &auth.password) {
        handle.sign_in(email, password).await?;
        return Ok(());
    }
    match previous.restorable() {
        Some(credentials) => {
            handle
                .restore(credentials.clone(), previous.current_patient.clone())
                .await
        }
        None => Err(Error::NotSignedIn),
    }
}

/// Drives `work` to completion, retrying each forced-synchronization prompt
/// it raises up to [`PROMPT_RETRIES`] times.
async fn answer_prompts<T>(
    handle: &ControllerHandle,
    prompts: &mut mpsc::UnboundedReceiver<ForceSyncReason>,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::pin!(work);
    let mut retries = 0;
    loop {
        tokio::select! {
            outcome = &mut work => return outcome,
            Some(reason) = prompts.recv() => {
                if retries == PROMPT_RETRIES {
                    return Err(Error::SyncRequired(reason));
                }
                retries += 1;
                warn!(%reason, retries, "synchronization required, retrying");
                handle.retry_sync().await?;
            }
        }
    }
}

async fn watch(handle: &ControllerHandle, output: OutputFormat) -> Result<()> {
    let mut changes = handle.subscribe();
    loop {
        print_state(&changes.borrow_and_update(), output)?;
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return Err(Error::ControllerStopped);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
        }
    }
}

fn print_state(state: &ClientState, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string(state)?),
        OutputFormat::Text => println!("{}", describe(state)),
    }
    Ok(())
}

/// One-line summary of what the mirror shows.
pub fn describe(state: &ClientState) -> String {
    let mirror = &state.mirror;
    let link = if mirror.connected { "online" } else { "offline" };
    let session = mirror
        .session
        .current
        .as_ref()
        .map_or("no session".to_string(), |s| format!("session {}", s.id));
    let page = mirror
        .session
        .display_page
        .as_ref()
        .map_or("-".to_string(), |p| p.id.clone());
    let mut line = format!(
        "{link} | {session} | page {page} | history {}",
        mirror.session.page_history.len()
    );
    if mirror.sync.is_synchronizing() {
        line.push_str(" | synchronizing");
    }
    if !mirror.gaze_enabled {
        line.push_str(" | gaze off");
    }
    line
}

/// Snapshot of the signed-in state, keeping fields this tool does not own.
pub fn snapshot_from(
    state: &ClientState,
    config: &Config,
    previous: &PersistedSnapshot,
) -> PersistedSnapshot {
    PersistedSnapshot {
        signin_credentials: state.credentials.clone(),
        logged_in: state.signed_in(),
        server_url: Some(config.server_url.clone()),
        current_user: state.user.clone(),
        current_patient: state.patient.clone(),
        transparency_level: previous.transparency_level,
    }
}

fn save_snapshot(path: &Path, snapshot: &PersistedSnapshot) {
    if let Err(e) = snapshot.save(path) {
        warn!(path = %path.display(), error = %e, "could not save sign-in state");
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
