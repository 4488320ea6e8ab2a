// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! What the controller needs from the user interface.

use lm_core::Page;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub use lm_core::ForceSyncReason;

/// UI side effects requested by the controller.
///
/// Calls are made from the controller task and must not block.
pub trait UiSink: Send + Sync {
    /// Dismissable error notice.
    fn show_error(&self, title: &str, message: &str);

    fn open_loading(&self);

    fn close_loading(&self);

    /// Blocking prompt whose only way out is a successful retry.
    fn open_force_sync(&self, reason: ForceSyncReason);

    fn close_force_sync(&self);

    /// The server rejected the stored token; ask for credentials again.
    fn open_login_prompt(&self);

    /// Go back to the home screen.
    fn reset_navigation(&self);

    /// A page brought back for a shuffle is on screen.
    fn page_ready_for_shuffle(&self, page: &Page);
}

/// Logs every request. Used by the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUi;

impl UiSink for TracingUi {
    fn show_error(&self, title: &str, message: &str) {
        error!(%title, %message, "error notice");
    }

    fn open_loading(&self) {
        info!("loading");
    }

    fn close_loading(&self) {
        info!("loading done");
    }

    fn open_force_sync(&self, reason: ForceSyncReason) {
        warn!(%reason, "synchronization required");
    }

    fn close_force_sync(&self) {
        info!("synchronization prompt closed");
    }

    fn open_login_prompt(&self) {
        warn!("server asked for a new sign-in");
    }

    fn reset_navigation(&self) {
        info!("navigation reset to home");
    }

    fn page_ready_for_shuffle(&self, page: &Page) {
        info!(page_id = %page.id, "page ready for shuffle");
    }
}

/// [`TracingUi`] that also hands every forced-synchronization prompt to the
/// receiver returned by [`PromptUi::new`], for callers with nobody to click
/// the retry button.
#[derive(Debug, Clone)]
pub struct PromptUi {
    prompts: mpsc::UnboundedSender<ForceSyncReason>,
}

impl PromptUi {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ForceSyncReason>) {
        let (prompts, rx) = mpsc::unbounded_channel();
        (PromptUi { prompts }, rx)
    }
}

impl UiSink for PromptUi {
    fn show_error(&self, title: &str, message: &str) {
        TracingUi.show_error(title, message);
    }

    fn open_loading(&self) {
        TracingUi.open_loading();
    }

    fn close_loading(&self) {
        TracingUi.close_loading();
    }

    fn open_force_sync(&self, reason: ForceSyncReason) {
        TracingUi.open_force_sync(reason);
        let _ = self.prompts.send(reason);
    }

    fn close_force_sync(&self) {
        TracingUi.close_force_sync();
    }

    fn open_login_prompt(&self) {
        TracingUi.open_login_prompt();
    }

    fn reset_navigation(&self) {
        TracingUi.reset_navigation();
    }

    fn page_ready_for_shuffle(&self, page: &Page) {
        TracingUi.page_ready_for_shuffle(page);
    }
}
