// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test doubles: an in-memory network, a scripted server and a
//! recording UI.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lm_core::{ClientMessage, ForceSyncReason, Page};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::api::{ApiError, ApiFuture, ApiRequest, ApiResponse, ApiResult, Method, ServerApi};
use crate::socket::{Transport, TransportError, TransportFactory, TransportFuture};
use crate::ui::UiSink;

/// Polls `cond` until it holds, failing the test after one second.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}

enum LinkInput {
    Frame(String),
    Close,
    Fail(String),
}

/// The server side of one mock transport.
pub struct MockLink {
    url: Mutex<Option<String>>,
    sent: Mutex<Vec<ClientMessage>>,
    closes: Mutex<Vec<Option<u16>>>,
    input: mpsc::UnboundedSender<LinkInput>,
    release: Notify,
    hold: bool,
    refuse: bool,
}

impl MockLink {
    /// Url the transport connected to.
    pub fn url(&self) -> Option<String> {
        self.url.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Close codes received, in order.
    pub fn closes(&self) -> Vec<Option<u16>> {
        self.closes.lock().unwrap().clone()
    }

    /// Delivers a text frame to the client.
    pub fn push_frame(&self, text: &str) {
        let _ = self.input.send(LinkInput::Frame(text.to_string()));
    }

    /// Server-side close.
    pub fn close(&self) {
        let _ = self.input.send(LinkInput::Close);
    }

    /// Transport error while receiving.
    pub fn fail(&self, reason: &str) {
        let _ = self.input.send(LinkInput::Fail(reason.to_string()));
    }

    /// Lets a held connect attempt finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

struct MockTransport {
    link: Arc<MockLink>,
    input: mpsc::UnboundedReceiver<LinkInput>,
    open: bool,
}

impl Transport for MockTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        Box::pin(async move {
            if self.link.hold {
                self.link.release.notified().await;
            }
            if self.link.refuse {
                return Err(TransportError::ConnectionFailed("refused".into()));
            }
            *self.link.url.lock().unwrap() = Some(url);
            self.open = true;
            Ok(())
        })
    }

    fn close(&mut self, code: Option<u16>, _reason: Option<String>) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.open = false;
            self.link.closes.lock().unwrap().push(code);
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if !self.open {
                return Err(TransportError::ConnectionClosed);
            }
            self.link.sent.lock().unwrap().push(msg);
            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<String>> {
        Box::pin(async move {
            match self.input.recv().await {
                Some(LinkInput::Frame(text)) => Ok(Some(text)),
                Some(LinkInput::Close) | None => {
                    self.open = false;
                    Ok(None)
                }
                Some(LinkInput::Fail(reason)) => {
                    self.open = false;
                    Err(TransportError::ReceiveFailed(reason))
                }
            }
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Default)]
struct NetworkState {
    links: Vec<Arc<MockLink>>,
    hold_connects: bool,
    refuse_connects: bool,
}

/// Hands out mock transports and keeps their server sides.
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect attempts made from now on wait for [`MockLink::release`].
    pub fn hold_connects(&self, hold: bool) {
        self.state.lock().unwrap().hold_connects = hold;
    }

    /// Connect attempts made from now on fail.
    pub fn refuse_connects(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_connects = refuse;
    }

    pub fn factory(&self) -> TransportFactory {
        let state = Arc::clone(&self.state);
        Arc::new(move || {
            let mut state = state.lock().unwrap();
            let (input, rx) = mpsc::unbounded_channel();
            let link = Arc::new(MockLink {
                url: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                closes: Mutex::new(Vec::new()),
                input,
                release: Notify::new(),
                hold: state.hold_connects,
                refuse: state.refuse_connects,
            });
            state.links.push(Arc::clone(&link));
            Box::new(MockTransport {
                link,
                input: rx,
                open: false,
            }) as Box<dyn Transport>
        })
    }

    /// Number of transports created so far.
    pub fn link_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    pub fn link(&self, index: usize) -> Arc<MockLink> {
        Arc::clone(&self.state.lock().unwrap().links[index])
    }

    pub fn last_link(&self) -> Arc<MockLink> {
        let state = self.state.lock().unwrap();
        Arc::clone(state.links.last().unwrap())
    }
}

enum Scripted {
    Ready(ApiResult<ApiResponse>),
    Later(oneshot::Receiver<ApiResult<ApiResponse>>),
}

/// Server double answering from per-route scripts.
///
/// Each `(method, path)` has a queue of answers; when it runs dry the
/// fallback for the route is used, and routes without either fail with a
/// network error.
#[derive(Default)]
pub struct MockApi {
    requests: Mutex<Vec<ApiRequest>>,
    scripts: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    fallbacks: Mutex<HashMap<(Method, String), ApiResult<ApiResponse>>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues one answer for a route.
    pub fn respond(&self, method: Method, path: &str, answer: ApiResult<ApiResponse>) {
        self.scripts
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted::Ready(answer));
    }

    /// Queues an answer the test delivers later through the returned sender.
    pub fn respond_later(
        &self,
        method: Method,
        path: &str,
    ) -> oneshot::Sender<ApiResult<ApiResponse>> {
        let (tx, rx) = oneshot::channel();
        self.scripts
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Scripted::Later(rx));
        tx
    }

    /// Answer used for a route once its queue is empty.
    pub fn always(&self, method: Method, path: &str, answer: ApiResult<ApiResponse>) {
        self.fallbacks
            .lock()
            .unwrap()
            .insert((method, path.to_string()), answer);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests made to one route.
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

impl ServerApi for MockApi {
    fn send(&self, req: ApiRequest) -> ApiFuture<'_> {
        let key = (req.method, req.path.clone());
        self.requests.lock().unwrap().push(req);
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        let fallback = self.fallbacks.lock().unwrap().get(&key).cloned();
        Box::pin(async move {
            match scripted {
                Some(Scripted::Ready(answer)) => answer,
                Some(Scripted::Later(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(ApiError::Network("answer dropped".into()))),
                None => fallback.unwrap_or_else(|| {
                    Err(ApiError::Network(format!("no answer for {:?} {}", key.0, key.1)))
                }),
            }
        })
    }
}

/// Successful answer with a body.
pub fn ok(data: Value) -> ApiResult<ApiResponse> {
    Ok(ApiResponse::new(200, data))
}

/// Answer with a failure status and one server error.
pub fn status(code: u16, message: &str) -> ApiResult<ApiResponse> {
    Ok(ApiResponse::new(
        code,
        serde_json::json!({ "errors": [message] }),
    ))
}

/// Successful sign-in answer carrying token headers.
pub fn signed_in(uid: &str, token: &str) -> ApiResult<ApiResponse> {
    Ok(ApiResponse::new(
        200,
        serde_json::json!({ "id": 1, "name": "Ada", "email": uid, "type": "Researcher" }),
    )
    .with_header("access-token", token)
    .with_header("client", "cli")
    .with_header("expiry", "99")
    .with_header("token-type", "Bearer")
    .with_header("uid", uid))
}

/// One call made on [`RecordingUi`].
#[derive(Debug, Clone, PartialEq)]
pub enum UiCall {
    Error { title: String, message: String },
    OpenLoading,
    CloseLoading,
    OpenForceSync(ForceSyncReason),
    CloseForceSync,
    LoginPrompt,
    ResetNavigation,
    ShuffleReady(String),
}

/// UI double that records every call.
#[derive(Default)]
pub struct RecordingUi {
    calls: Mutex<Vec<UiCall>>,
}

impl RecordingUi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<UiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &UiCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn errors(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, UiCall::Error { .. }))
            .count()
    }

    fn record(&self, call: UiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl UiSink for RecordingUi {
    fn show_error(&self, title: &str, message: &str) {
        self.record(UiCall::Error {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn open_loading(&self) {
        self.record(UiCall::OpenLoading);
    }

    fn close_loading(&self) {
        self.record(UiCall::CloseLoading);
    }

    fn open_force_sync(&self, reason: ForceSyncReason) {
        self.record(UiCall::OpenForceSync(reason));
    }

    fn close_force_sync(&self) {
        self.record(UiCall::CloseForceSync);
    }

    fn open_login_prompt(&self) {
        self.record(UiCall::LoginPrompt);
    }

    fn reset_navigation(&self) {
        self.record(UiCall::ResetNavigation);
    }

    fn page_ready_for_shuffle(&self, page: &Page) {
        self.record(UiCall::ShuffleReady(page.id.clone()));
    }
}
