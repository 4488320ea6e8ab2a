// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Controller actor: the single owner of the mirror state.
//!
//! ```text
//!  ControllerHandle ──commands──►┌────────────┐──► UiSink
//!  Connection ───────events─────►│ Controller │──► ServerApi (spawned calls)
//!  spawned calls ───internal────►└────────────┘──► watch<ClientState>
//! ```
//!
//! Every mutation happens inside [`Controller::run`], one message at a time.
//! HTTP calls run in spawned tasks and report back as internal messages, so
//! socket frames keep flowing while a request is in flight. Synchronization
//! answers carry the attempt they belong to and are dropped once that
//! attempt is no longer the running one.

use std::sync::Arc;

use lm_core::{
    classify_records, ClientMessage, Credentials, MirrorState, Patient, PollVerdict,
    ShuffleStep, SyncRecord, Tree, TreeLoadRecord, User,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, ApiRequest, ApiResponse, ApiResult, ServerApi, AUTH_SIGN_IN};
use crate::config::Config;
use crate::dispatch::{dispatch_frame, Effect};
use crate::error::{Error, Result};
use crate::socket::{
    ConnectParams, Connection, ConnectionEvent, LinkEvent, TransportFactory,
    CLOSE_SERVICE_RESTART,
};
use crate::ui::{ForceSyncReason, UiSink};

const COMMAND_CHANNEL_SIZE: usize = 32;

const SERVER_ERROR: &str = "Server communication error";
const SYNC_ERROR: &str = "Synchronization error";
const PATIENT_ERROR: &str = "Partner error";

/// Lifecycle state reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Active,
    Background,
    Inactive,
}

/// Snapshot published after every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientState {
    pub mirror: MirrorState,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
    pub user: Option<User>,
    pub patient: Option<Patient>,
}

impl ClientState {
    pub fn signed_in(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Tokens and user returned by a successful sign-in.
#[derive(Debug, Clone)]
struct SignIn {
    credentials: Credentials,
    user: User,
}

impl SignIn {
    fn from_response(resp: &ApiResponse, fallback: Option<&Credentials>) -> ApiResult<Self> {
        let credentials = resp
            .credentials()
            .or_else(|| fallback.cloned())
            .ok_or_else(|| ApiError::Decode("sign-in answer carries no tokens".into()))?;
        Ok(SignIn {
            credentials,
            user: resp.json()?,
        })
    }
}

enum Command {
    SignIn {
        email: String,
        password: String,
        reply: oneshot::Sender<Result<User>>,
    },
    SignInGuest {
        reply: oneshot::Sender<Result<Patient>>,
    },
    Restore {
        credentials: Credentials,
        patient: Option<Patient>,
        reply: oneshot::Sender<Result<()>>,
    },
    SignOut {
        reply: oneshot::Sender<()>,
    },
    AppStateChanged(AppState),
    SelectPatient {
        patient: Patient,
        reply: oneshot::Sender<()>,
    },
    PushTree {
        tree: Tree,
        sub_flow: bool,
        reply: oneshot::Sender<Result<String>>,
    },
    StartSync {
        reply: oneshot::Sender<Result<Patient>>,
    },
    RetrySync,
    CheckQueuedSync {
        patient: Patient,
        reply: oneshot::Sender<Result<Patient>>,
    },
    NavigateBack {
        reply: oneshot::Sender<bool>,
    },
    RequestShuffle {
        reply: oneshot::Sender<ShuffleStep>,
    },
}

/// Answers of spawned HTTP calls.
enum Internal {
    SignedIn {
        outcome: ApiResult<SignIn>,
        reply: oneshot::Sender<Result<User>>,
    },
    GuestSignedIn {
        outcome: ApiResult<(SignIn, Patient)>,
        reply: oneshot::Sender<Result<Patient>>,
    },
    Restored {
        credentials: Credentials,
        patient: Option<Patient>,
        outcome: ApiResult<ApiResponse>,
        reply: oneshot::Sender<Result<()>>,
    },
    SyncInitiated {
        attempt: u64,
        outcome: ApiResult<ApiResponse>,
    },
    SyncPolled {
        attempt: u64,
        outcome: ApiResult<ApiResponse>,
    },
    PatientRefreshed {
        attempt: u64,
        outcome: ApiResult<ApiResponse>,
    },
    QueuedChecked {
        patient: Patient,
        outcome: ApiResult<ApiResponse>,
        reply: oneshot::Sender<Result<Patient>>,
    },
    TreeReported {
        uid: String,
        outcome: ApiResult<ApiResponse>,
        reply: oneshot::Sender<Result<String>>,
    },
}

/// Who is waiting for a synchronization to complete.
enum Completion {
    Reply(oneshot::Sender<Result<Patient>>),
    /// Re-run the queued-object check with the refreshed partner.
    Recheck(oneshot::Sender<Result<Patient>>),
}

/// The synchronization the forced-sync prompt retries.
struct SyncJob {
    patient: Patient,
    completions: Vec<Completion>,
}

/// Cloneable front end of the controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ClientState>,
}

impl ControllerHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::ControllerStopped)?;
        rx.await.map_err(|_| Error::ControllerStopped)
    }

    async fn notify(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| Error::ControllerStopped)
    }

    /// Signs in with email and password and connects the socket.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let (email, password) = (email.to_string(), password.to_string());
        self.request(|reply| Command::SignIn {
            email,
            password,
            reply,
        })
        .await?
    }

    /// Signs in with the shared guest account and selects its partner.
    pub async fn sign_in_guest(&self) -> Result<Patient> {
        self.request(|reply| Command::SignInGuest { reply }).await?
    }

    /// Signs in again with stored credentials, keeping the stored partner.
    pub async fn restore(&self, credentials: Credentials, patient: Option<Patient>) -> Result<()> {
        self.request(|reply| Command::Restore {
            credentials,
            patient,
            reply,
        })
        .await?
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.request(|reply| Command::SignOut { reply }).await
    }

    pub async fn app_state_changed(&self, state: AppState) -> Result<()> {
        self.notify(Command::AppStateChanged(state)).await
    }

    /// Selects the partner; a different partner resets the session.
    pub async fn select_patient(&self, patient: Patient) -> Result<()> {
        self.request(|reply| Command::SelectPatient { patient, reply })
            .await
    }

    /// Pushes the tree a session starts with and returns its instance id.
    ///
    /// The push is reported to the server and undone if that fails.
    pub async fn load_tree(&self, tree: Tree) -> Result<String> {
        self.request(|reply| Command::PushTree {
            tree,
            sub_flow: false,
            reply,
        })
        .await?
    }

    /// Opens a sub-flow on top of the running tree, remembering the page on
    /// screen so the parent resumes there. Undone if the server rejects it.
    pub async fn add_tree_to_session(&self, tree: Tree) -> Result<String> {
        self.request(|reply| Command::PushTree {
            tree,
            sub_flow: true,
            reply,
        })
        .await?
    }

    /// Runs a synchronization of the selected partner.
    ///
    /// Resolves with the refreshed partner once both directions have
    /// reported, or with the current partner when the request itself failed.
    pub async fn start_sync(&self) -> Result<Patient> {
        self.request(|reply| Command::StartSync { reply }).await?
    }

    /// The forced-sync prompt's retry action.
    pub async fn retry_sync(&self) -> Result<()> {
        self.notify(Command::RetrySync).await
    }

    /// Resolves once `patient` has no objects queued for synchronization.
    pub async fn check_queued_sync(&self, patient: Patient) -> Result<Patient> {
        self.request(|reply| Command::CheckQueuedSync { patient, reply })
            .await?
    }

    /// Walks back one page. Returns false when there is nowhere to go.
    pub async fn navigate_back(&self) -> Result<bool> {
        self.request(|reply| Command::NavigateBack { reply }).await
    }

    pub async fn request_shuffle(&self) -> Result<ShuffleStep> {
        self.request(|reply| Command::RequestShuffle { reply }).await
    }

    /// Current snapshot.
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.clone()
    }
}

/// The actor. Build with [`Controller::new`], then drive with [`Controller::run`].
pub struct Controller {
    config: Config,
    api: Arc<dyn ServerApi>,
    ui: Arc<dyn UiSink>,
    client: ClientState,
    connection: Connection,
    connection_events: mpsc::Receiver<ConnectionEvent>,
    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    published: watch::Sender<ClientState>,
    job: Option<SyncJob>,
    retry_after_login: bool,
}

impl Controller {
    pub fn new(
        config: Config,
        api: Arc<dyn ServerApi>,
        ui: Arc<dyn UiSink>,
        transports: TransportFactory,
    ) -> (Self, ControllerHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (published, state) = watch::channel(ClientState::default());
        let (connection, connection_events) = Connection::new(transports);

        let controller = Controller {
            config,
            api,
            ui,
            client: ClientState::default(),
            connection,
            connection_events,
            commands,
            internal_tx,
            internal_rx,
            published,
            job: None,
            retry_after_login: false,
        };
        let handle = ControllerHandle {
            commands: commands_tx,
            state,
        };
        (controller, handle)
    }

    /// Processes messages until every handle is dropped.
    pub async fn run(mut self) {
        info!("controller started");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(msg) = self.internal_rx.recv() => self.handle_internal(msg),
                Some(event) = self.connection_events.recv() => self.handle_connection_event(event),
            }
            self.publish();
        }
        self.connection.close(None, None);
        info!("controller stopped");
    }

    fn publish(&mut self) {
        self.client.mirror.connected = !self.connection.is_closed();
        let current = &self.client;
        self.published.send_if_modified(|published| {
            if published == current {
                false
            } else {
                *published = current.clone();
                true
            }
        });
    }

    /// Publishes before answering so callers observe the state they caused.
    fn reply<T>(&mut self, tx: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = tx.send(value);
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SignIn {
                email,
                password,
                reply,
            } => self.spawn_sign_in(email, password, reply),
            Command::SignInGuest { reply } => self.spawn_guest_sign_in(reply),
            Command::Restore {
                credentials,
                patient,
                reply,
            } => {
                let api = Arc::clone(&self.api);
                let internal = self.internal_tx.clone();
                let server_url = self.config.server_url.clone();
                tokio::spawn(async move {
                    let outcome = api
                        .send(ApiRequest::sign_in_stored(&credentials, &server_url))
                        .await;
                    let _ = internal.send(Internal::Restored {
                        credentials,
                        patient,
                        outcome,
                        reply,
                    });
                });
            }
            Command::SignOut { reply } => {
                self.sign_out();
                self.reply(reply, ());
            }
            Command::AppStateChanged(state) => self.app_state_changed(state),
            Command::SelectPatient { patient, reply } => {
                self.select_patient(patient);
                self.reply(reply, ());
            }
            Command::PushTree {
                tree,
                sub_flow,
                reply,
            } => self.push_tree(tree, sub_flow, reply),
            Command::StartSync { reply } => self.start_sync(reply),
            Command::RetrySync => self.retry_sync(),
            Command::CheckQueuedSync { patient, reply } => self.check_queued(patient, reply),
            Command::NavigateBack { reply } => {
                let nav = self.client.mirror.session.navigate_back();
                let moved = nav.is_some();
                if let Some(nav) = nav {
                    self.apply_effects(vec![Effect::PostEvent(nav)]);
                }
                self.reply(reply, moved);
            }
            Command::RequestShuffle { reply } => {
                let step = self.client.mirror.session.request_shuffle();
                match &step {
                    ShuffleStep::Ready(page) => self.ui.page_ready_for_shuffle(page),
                    ShuffleStep::BackFirst(nav) => {
                        self.apply_effects(vec![Effect::PostEvent(nav.clone())]);
                    }
                    ShuffleStep::Nothing => debug!("nothing to shuffle"),
                }
                self.reply(reply, step);
            }
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::SignedIn { outcome, reply } => match outcome {
                Ok(sign_in) => {
                    let user = sign_in.user.clone();
                    self.signed_in(sign_in);
                    self.reply(reply, Ok(user));
                }
                Err(e) => {
                    error!(error = %e, "sign-in failed");
                    self.ui.show_error(SERVER_ERROR, &e.to_string());
                    self.reply(reply, Err(e.into()));
                }
            },
            Internal::GuestSignedIn { outcome, reply } => match outcome {
                Ok((sign_in, patient)) => {
                    self.signed_in(sign_in);
                    self.select_patient(patient.clone());
                    self.reply(reply, Ok(patient));
                }
                Err(e) => {
                    error!(error = %e, "guest sign-in failed");
                    self.ui.show_error(SERVER_ERROR, &e.to_string());
                    self.reply(reply, Err(e.into()));
                }
            },
            Internal::Restored {
                credentials,
                patient,
                outcome,
                reply,
            } => self.restored(credentials, patient, outcome, reply),
            Internal::SyncInitiated { attempt, outcome } => self.sync_initiated(attempt, outcome),
            Internal::SyncPolled { attempt, outcome } => self.sync_polled(attempt, outcome),
            Internal::PatientRefreshed { attempt, outcome } => {
                self.patient_refreshed(attempt, outcome)
            }
            Internal::QueuedChecked {
                patient,
                outcome,
                reply,
            } => self.queued_checked(patient, outcome, reply),
            Internal::TreeReported {
                uid,
                outcome,
                reply,
            } => self.tree_reported(uid, outcome, reply),
        }
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match self.connection.handle_event(event) {
            Some(LinkEvent::Opened) => {}
            Some(LinkEvent::Frame(text)) => {
                let effects = dispatch_frame(&mut self.client.mirror, &text);
                self.apply_effects(effects);
            }
            Some(LinkEvent::Lost { reconnecting }) => {
                info!(reconnecting, "socket lost, clearing page history");
                self.client.mirror.session.clear_history();
            }
            None => {}
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PostEvent(nav) => self.post_event(nav),
                Effect::ForceSync(reason) => {
                    warn!(%reason, "synchronization failed");
                    self.ui.open_force_sync(reason);
                }
                Effect::SyncFinished => self.refresh_patient(),
                Effect::LoginPrompt => {
                    self.retry_after_login = true;
                    self.ui.open_login_prompt();
                }
                Effect::ResetNavigation => self.ui.reset_navigation(),
                Effect::ShufflePage(page) => self.ui.page_ready_for_shuffle(&page),
            }
        }
    }

    fn post_event(&self, nav: lm_core::NavigationEvent) {
        let Some(credentials) = self.client.credentials.clone() else {
            warn!(endpoint = nav.endpoint(), "not signed in, session event dropped");
            return;
        };
        let endpoint = nav.endpoint();
        let request = match ApiRequest::event(&credentials, endpoint, &nav.record()) {
            Ok(request) => request,
            Err(e) => {
                error!(endpoint, error = %e, "could not encode session event");
                return;
            }
        };
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            match api.send(request).await.and_then(ApiResponse::check) {
                Ok(_) => debug!(endpoint, "session event posted"),
                Err(e) => error!(endpoint, error = %e, "session event failed"),
            }
        });
    }

    fn push_tree(&mut self, tree: Tree, sub_flow: bool, reply: oneshot::Sender<Result<String>>) {
        let session = &mut self.client.mirror.session;
        let record = TreeLoadRecord::new(session.current.as_ref(), tree.clone());
        let uid = if sub_flow {
            session.add_tree(tree)
        } else {
            session.load_tree(tree)
        };

        let request = match &self.client.credentials {
            Some(credentials) => ApiRequest::tree_loaded(credentials, &record).map_err(Error::from),
            None => Err(Error::NotSignedIn),
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!(%uid, error = %e, "tree not reported, undoing push");
                self.client.mirror.session.remove_tree(&uid);
                self.reply(reply, Err(e));
                return;
            }
        };

        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = api.send(request).await;
            let _ = internal.send(Internal::TreeReported {
                uid,
                outcome,
                reply,
            });
        });
    }

    fn tree_reported(
        &mut self,
        uid: String,
        outcome: ApiResult<ApiResponse>,
        reply: oneshot::Sender<Result<String>>,
    ) {
        match outcome.and_then(ApiResponse::check) {
            Ok(_) => {
                debug!(%uid, "tree reported");
                self.reply(reply, Ok(uid));
            }
            Err(e) => {
                error!(%uid, error = %e, "could not report tree, undoing push");
                self.client.mirror.session.remove_tree(&uid);
                self.ui.show_error(SERVER_ERROR, &e.to_string());
                self.reply(reply, Err(e.into()));
            }
        }
    }

    // Authentication

    fn spawn_sign_in(
        &self,
        email: String,
        password: String,
        reply: oneshot::Sender<Result<User>>,
    ) {
        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        let server_url = self.config.server_url.clone();
        tokio::spawn(async move {
            let outcome = sign_in_request(api.as_ref(), &server_url, &email, &password).await;
            let _ = internal.send(Internal::SignedIn { outcome, reply });
        });
    }

    fn spawn_guest_sign_in(&self, reply: oneshot::Sender<Result<Patient>>) {
        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        let server_url = self.config.server_url.clone();
        let email = self.config.guest_email.clone();
        let password = self.config.guest_password.clone();
        tokio::spawn(async move {
            let outcome = async {
                let sign_in = sign_in_at(
                    api.as_ref(),
                    AUTH_SIGN_IN,
                    &server_url,
                    &email,
                    &password,
                )
                .await?;
                let patients: Vec<Patient> = api
                    .send(ApiRequest::patients(&sign_in.credentials))
                    .await?
                    .check()?
                    .json()?;
                let patient = patients
                    .into_iter()
                    .next()
                    .ok_or_else(|| ApiError::Decode("guest account has no partner".into()))?;
                Ok::<_, ApiError>((sign_in, patient))
            }
            .await;
            let _ = internal.send(Internal::GuestSignedIn { outcome, reply });
        });
    }

    fn restored(
        &mut self,
        credentials: Credentials,
        patient: Option<Patient>,
        outcome: ApiResult<ApiResponse>,
        reply: oneshot::Sender<Result<()>>,
    ) {
        let resp = match outcome {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "stored sign-in failed");
                self.ui.show_error(SERVER_ERROR, &e.to_string());
                self.reply(reply, Err(e.into()));
                return;
            }
        };
        if let Err(e) = resp.clone().check() {
            warn!(error = %e, "stored credentials rejected, signing out");
            self.client.credentials = Some(credentials);
            self.sign_out();
            self.reply(reply, Err(e.into()));
            return;
        }

        match SignIn::from_response(&resp, Some(&credentials)) {
            Ok(sign_in) => {
                self.signed_in(sign_in);
                if let Some(patient) = patient {
                    self.client.patient = Some(patient);
                }
                self.reply(reply, Ok(()));
            }
            Err(e) => {
                error!(error = %e, "unexpected stored sign-in answer");
                self.ui.show_error(SERVER_ERROR, &e.to_string());
                self.reply(reply, Err(e.into()));
            }
        }
    }

    fn signed_in(&mut self, sign_in: SignIn) {
        info!(uid = %sign_in.credentials.uid, "signed in");
        if !self.retry_after_login {
            self.client.patient = None;
        }
        self.client.credentials = Some(sign_in.credentials);
        self.client.user = Some(sign_in.user);
        self.connect();

        if std::mem::take(&mut self.retry_after_login) {
            info!("retrying synchronization after sign-in");
            self.retry_sync();
        }
    }

    fn connect(&mut self) {
        let Some(credentials) = &self.client.credentials else {
            return;
        };
        let params = self
            .config
            .socket_url(credentials)
            .and_then(|url| {
                Ok(ConnectParams {
                    url: url.to_string(),
                    subscription: ClientMessage::mirror_subscription()?,
                    reconnect_on_error: self.config.reconnect_on_error,
                })
            });
        match params {
            Ok(params) => {
                self.connection.close(Some(CLOSE_SERVICE_RESTART), None);
                self.connection.open_with(params);
            }
            Err(e) => {
                error!(error = %e, "cannot build socket url");
                self.ui.show_error(SERVER_ERROR, &e.to_string());
            }
        }
    }

    fn sign_out(&mut self) {
        if let Some(credentials) = self.client.credentials.take() {
            let api = Arc::clone(&self.api);
            tokio::spawn(async move {
                match api
                    .send(ApiRequest::sign_out(&credentials))
                    .await
                    .and_then(ApiResponse::check)
                {
                    Ok(_) => info!("signed out"),
                    Err(e) => warn!(error = %e, "server sign-out failed, signed out locally"),
                }
            });
        }
        self.client.user = None;
        self.client.patient = None;
        self.connection.close(None, None);
        self.client.mirror.end_session();
        self.client.mirror.sync.finish();
        self.retry_after_login = false;
        if let Some(job) = self.job.take() {
            for completion in job.completions {
                match completion {
                    Completion::Reply(tx) | Completion::Recheck(tx) => {
                        self.reply(tx, Err(Error::NotSignedIn));
                    }
                }
            }
        }
    }

    fn app_state_changed(&mut self, state: AppState) {
        debug!(?state, "app state changed");
        match state {
            AppState::Active => {
                if self.client.signed_in() && self.connection.is_closed() {
                    self.connection.open();
                }
            }
            AppState::Background | AppState::Inactive => {
                if !self.client.signed_in() {
                    return;
                }
                self.connection.close(None, None);
                if self.client.mirror.session.is_active() {
                    self.client.mirror.session.clear_history();
                }
            }
        }
    }

    fn select_patient(&mut self, patient: Patient) {
        let changed = self
            .client
            .patient
            .as_ref()
            .map_or(true, |current| current.id != patient.id);
        if changed {
            info!(patient_id = %patient.id, "partner changed, resetting session");
            self.client.mirror.session.new_session(None);
        }
        self.client.patient = Some(patient);
    }

    // Synchronization

    fn start_sync(&mut self, reply: oneshot::Sender<Result<Patient>>) {
        if self.client.mirror.sync.is_synchronizing() {
            self.reply(reply, Err(Error::SyncInProgress));
            return;
        }
        let Some(patient) = self.client.patient.clone() else {
            self.reply(reply, Err(Error::NoPatient));
            return;
        };
        self.job = Some(SyncJob {
            patient,
            completions: vec![Completion::Reply(reply)],
        });
        self.launch_sync();
    }

    fn retry_sync(&mut self) {
        self.ui.close_force_sync();
        if self.job.is_none() {
            let Some(patient) = self.client.patient.clone() else {
                warn!("retry requested without a partner");
                return;
            };
            self.job = Some(SyncJob {
                patient,
                completions: Vec::new(),
            });
        }
        self.launch_sync();
    }

    fn launch_sync(&mut self) {
        let Some(patient_id) = self.job.as_ref().map(|job| job.patient.id.clone()) else {
            return;
        };
        let attempt = self.client.mirror.sync.begin();
        self.ui.open_loading();

        let Some(credentials) = self.client.credentials.clone() else {
            self.ui
                .show_error(SYNC_ERROR, &Error::NotSignedIn.to_string());
            self.complete_sync();
            return;
        };
        info!(attempt, %patient_id, "synchronization requested");

        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = api
                .send(ApiRequest::start_synchronization(&credentials, &patient_id))
                .await;
            let _ = internal.send(Internal::SyncInitiated { attempt, outcome });
        });
    }

    fn sync_initiated(&mut self, attempt: u64, outcome: ApiResult<ApiResponse>) {
        if !self.client.mirror.sync.is_current(attempt) {
            debug!(attempt, "answer for a superseded synchronization ignored");
            return;
        }
        if let Err(e) = outcome.and_then(ApiResponse::check) {
            error!(attempt, error = %e, "synchronization request failed");
            self.ui.show_error(SYNC_ERROR, &e.to_string());
            self.complete_sync();
            return;
        }

        let (Some(credentials), Some(patient_id)) = (
            self.client.credentials.clone(),
            self.job.as_ref().map(|job| job.patient.id.clone()),
        ) else {
            return;
        };
        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = api
                .send(ApiRequest::synchronizations(&credentials, &patient_id))
                .await;
            let _ = internal.send(Internal::SyncPolled { attempt, outcome });
        });
    }

    fn sync_polled(&mut self, attempt: u64, outcome: ApiResult<ApiResponse>) {
        let sync = &self.client.mirror.sync;
        if !sync.is_current(attempt) || sync.progress().is_some_and(|p| p.is_done()) {
            debug!(attempt, "synchronization records no longer needed");
            return;
        }

        let records = match outcome
            .and_then(ApiResponse::check)
            .and_then(|resp| resp.json::<Vec<SyncRecord>>())
        {
            Ok(records) => records,
            Err(e) => {
                error!(attempt, error = %e, "could not read synchronization records");
                self.ui.show_error(SYNC_ERROR, &e.to_string());
                Vec::new()
            }
        };

        match classify_records(&records) {
            PollVerdict::Completed => {
                info!(attempt, "synchronization completed");
                self.complete_sync();
            }
            PollVerdict::Prompt(reason) => {
                warn!(attempt, %reason, "synchronization incomplete");
                self.ui.close_loading();
                self.ui.open_force_sync(reason);
            }
        }
    }

    fn refresh_patient(&mut self) {
        let attempt = self.client.mirror.sync.attempt();
        let patient_id = self
            .client
            .patient
            .as_ref()
            .or(self.job.as_ref().map(|job| &job.patient))
            .map(|p| p.id.clone());
        let (Some(credentials), Some(patient_id)) =
            (self.client.credentials.clone(), patient_id)
        else {
            self.complete_sync();
            return;
        };

        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = api
                .send(ApiRequest::patient(&credentials, &patient_id))
                .await;
            let _ = internal.send(Internal::PatientRefreshed { attempt, outcome });
        });
    }

    fn patient_refreshed(&mut self, attempt: u64, outcome: ApiResult<ApiResponse>) {
        if !self.client.mirror.sync.is_current(attempt) {
            debug!(attempt, "partner refresh for a superseded synchronization ignored");
            return;
        }
        match outcome
            .and_then(ApiResponse::check)
            .and_then(|resp| resp.json::<Patient>())
        {
            Ok(patient) => self.client.patient = Some(patient),
            Err(e) => {
                error!(error = %e, "could not refresh partner");
                self.ui.show_error(PATIENT_ERROR, &e.to_string());
            }
        }
        info!(attempt, "synchronization finished");
        self.complete_sync();
    }

    /// Resolves every waiter with the current partner and returns to idle.
    fn complete_sync(&mut self) {
        self.client.mirror.sync.finish();
        self.ui.close_loading();

        let patient = self
            .client
            .patient
            .clone()
            .or_else(|| self.job.as_ref().map(|job| job.patient.clone()));
        let completions = self
            .job
            .as_mut()
            .map(|job| std::mem::take(&mut job.completions))
            .unwrap_or_default();

        for completion in completions {
            match (completion, patient.clone()) {
                (Completion::Reply(tx), patient) => {
                    self.reply(tx, patient.ok_or(Error::NoPatient));
                }
                (Completion::Recheck(tx), Some(patient)) => self.check_queued(patient, tx),
                (Completion::Recheck(tx), None) => {
                    self.reply(tx, Err(Error::NoPatient));
                }
            }
        }
    }

    fn check_queued(&mut self, patient: Patient, reply: oneshot::Sender<Result<Patient>>) {
        if patient.is_guest() {
            debug!("guest partner, queued-object check skipped");
            self.reply(reply, Ok(patient));
            return;
        }
        let Some(credentials) = self.client.credentials.clone() else {
            self.reply(reply, Err(Error::NotSignedIn));
            return;
        };

        let api = Arc::clone(&self.api);
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = api
                .send(ApiRequest::queued_synchronizables(&credentials, &patient.id))
                .await;
            let _ = internal.send(Internal::QueuedChecked {
                patient,
                outcome,
                reply,
            });
        });
    }

    fn queued_checked(
        &mut self,
        patient: Patient,
        outcome: ApiResult<ApiResponse>,
        reply: oneshot::Sender<Result<Patient>>,
    ) {
        let resp = match outcome.and_then(ApiResponse::check) {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "queued-object check failed");
                self.ui.show_error(PATIENT_ERROR, &e.to_string());
                self.reply(reply, Err(e.into()));
                return;
            }
        };

        let queued = match &resp.data {
            Value::Array(items) => items.len(),
            Value::Null => 0,
            other => {
                warn!(body = %other, "unexpected queued-object answer");
                0
            }
        };
        if queued == 0 {
            self.reply(reply, Ok(patient));
            return;
        }

        info!(patient_id = %patient.id, queued, "objects waiting for synchronization");
        let running = self.client.mirror.sync.is_synchronizing();
        let completion = Completion::Recheck(reply);
        match &mut self.job {
            Some(job) if running => job.completions.push(completion),
            job => {
                *job = Some(SyncJob {
                    patient,
                    completions: vec![completion],
                });
            }
        }
        self.ui.open_force_sync(ForceSyncReason::PendingObjects);
    }
}

/// `POST sign_in`, retried once at the auth route when the server answers 303.
async fn sign_in_request(
    api: &dyn ServerApi,
    server_url: &str,
    email: &str,
    password: &str,
) -> ApiResult<SignIn> {
    let resp = api
        .send(ApiRequest::sign_in("sign_in", email, password, server_url))
        .await?;
    if resp.status == 303 {
        debug!("sign-in redirected to the auth route");
        return sign_in_at(api, AUTH_SIGN_IN, server_url, email, password).await;
    }
    SignIn::from_response(&resp.check()?, None)
}

async fn sign_in_at(
    api: &dyn ServerApi,
    route: &str,
    server_url: &str,
    email: &str,
    password: &str,
) -> ApiResult<SignIn> {
    let resp = api
        .send(ApiRequest::sign_in(route, email, password, server_url))
        .await?
        .check()?;
    SignIn::from_response(&resp, None)
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
