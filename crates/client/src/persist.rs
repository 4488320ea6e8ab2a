// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted snapshot: the few top-level fields that survive a restart.
//!
//! Session and synchronization state are never persisted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lm_core::{Credentials, Patient, User};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const STATE_FILE_NAME: &str = "state.json";

/// Whitelisted fields written by the app shell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    #[serde(default)]
    pub signin_credentials: Option<Credentials>,
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub current_user: Option<User>,
    #[serde(default)]
    pub current_patient: Option<Patient>,
    #[serde(default)]
    pub transparency_level: Option<f64>,
}

impl PersistedSnapshot {
    /// Default snapshot location under the user data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("livemirror").join(STATE_FILE_NAME))
    }

    /// Loads the snapshot; a missing file is an empty snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes the snapshot through a temporary file and a rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Stored credentials, when the last run ended signed in.
    pub fn restorable(&self) -> Option<&Credentials> {
        if self.logged_in {
            self.signin_credentials.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
