// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase synchronization reducer.
//!
//! A synchronization runs an upload and a download on the server. Their
//! results arrive as two independent socket messages in any order. A
//! failure in either direction aborts both, so it marks the other direction
//! as completed too and asks the user to retry.

use serde::Serialize;

use crate::model::{SyncDirection, SyncRecord};
use crate::protocol::SyncResult;

/// Why the blocking synchronization prompt is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceSyncReason {
    Upload,
    Download,
    /// An earlier synchronization never completed.
    Previous,
    /// The partner still has objects queued for synchronization.
    PendingObjects,
}

impl ForceSyncReason {
    /// Prompt raised by a failed result in `direction`.
    pub fn for_direction(direction: SyncDirection) -> Option<Self> {
        match direction {
            SyncDirection::Up => Some(ForceSyncReason::Upload),
            SyncDirection::Down => Some(ForceSyncReason::Download),
            SyncDirection::Previous => Some(ForceSyncReason::Previous),
            SyncDirection::Unknown => None,
        }
    }
}

impl std::fmt::Display for ForceSyncReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ForceSyncReason::Upload => "upload failed",
            ForceSyncReason::Download => "download failed",
            ForceSyncReason::Previous => "previous synchronization failed",
            ForceSyncReason::PendingObjects => "objects waiting for synchronization",
        };
        write!(f, "{s}")
    }
}

/// Per-direction completion of a running synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub up_completed: bool,
    pub down_completed: bool,
}

impl SyncProgress {
    pub fn is_done(&self) -> bool {
        self.up_completed && self.down_completed
    }
}

/// Effect of one result on the reducer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultOutcome {
    /// Open the blocking retry prompt for this reason.
    pub prompt: Option<ForceSyncReason>,
    /// Both directions just completed: refresh the partner and resolve.
    pub finished: bool,
}

/// Verdict of the synchronization records fetched after initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollVerdict {
    Completed,
    Prompt(ForceSyncReason),
}

/// Classifies the records of `GET synchronizations`, most recent first.
///
/// Completed only when the latest upload and the latest download both exist,
/// are finished and succeeded. Upload problems win the prompt.
pub fn classify_records(records: &[SyncRecord]) -> PollVerdict {
    let latest = |direction: SyncDirection| records.iter().find(|r| r.direction == direction);
    let upload_ok = latest(SyncDirection::Up).is_some_and(SyncRecord::is_settled_ok);
    let download_ok = latest(SyncDirection::Down).is_some_and(SyncRecord::is_settled_ok);

    match (upload_ok, download_ok) {
        (true, true) => PollVerdict::Completed,
        (false, _) => PollVerdict::Prompt(ForceSyncReason::Upload),
        (true, false) => PollVerdict::Prompt(ForceSyncReason::Download),
    }
}

/// Synchronization state: idle, running, or finishing.
///
/// `progress` is `Some` from the initiation request until the completion has
/// been resolved. Every [`SyncState::begin`] starts a new attempt so late
/// answers to a superseded request can be recognized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    progress: Option<SyncProgress>,
    attempt: u64,
    #[serde(skip)]
    finishing: bool,
}

impl SyncState {
    pub fn progress(&self) -> Option<SyncProgress> {
        self.progress
    }

    pub fn is_synchronizing(&self) -> bool {
        self.progress.is_some()
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// True while `attempt` is the running one.
    pub fn is_current(&self, attempt: u64) -> bool {
        self.progress.is_some() && self.attempt == attempt
    }

    /// Starts a new attempt and returns its number.
    pub fn begin(&mut self) -> u64 {
        self.attempt += 1;
        self.progress = Some(SyncProgress::default());
        self.finishing = false;
        self.attempt
    }

    /// Returns to idle.
    pub fn finish(&mut self) {
        self.progress = None;
        self.finishing = false;
    }

    /// Applies one directional result.
    ///
    /// While idle, successes are ignored and failures only raise the prompt.
    /// Once both directions are complete, later results are ignored until
    /// [`SyncState::finish`].
    pub fn apply_result(&mut self, result: &SyncResult) -> ResultOutcome {
        let failed_prompt = if result.success {
            None
        } else {
            ForceSyncReason::for_direction(result.direction)
        };

        let Some(mut progress) = self.progress else {
            return ResultOutcome {
                prompt: failed_prompt,
                finished: false,
            };
        };
        if self.finishing {
            return ResultOutcome::default();
        }

        match (result.direction, result.success) {
            (SyncDirection::Up, ok) => {
                progress.up_completed = true;
                progress.down_completed |= !ok;
            }
            (SyncDirection::Down, ok) => {
                progress.down_completed = true;
                progress.up_completed |= !ok;
            }
            (SyncDirection::Previous, false) => {
                progress.up_completed = true;
                progress.down_completed = true;
            }
            (SyncDirection::Previous, true) | (SyncDirection::Unknown, _) => {}
        }

        self.progress = Some(progress);
        self.finishing = progress.is_done();
        ResultOutcome {
            prompt: failed_prompt,
            finished: self.finishing,
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
