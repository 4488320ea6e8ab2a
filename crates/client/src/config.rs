// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Stored as TOML in `<config dir>/livemirror/config.toml`. Every field has
//! a default, so a missing or partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};

use lm_core::Credentials;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

const APP_DIR_NAME: &str = "livemirror";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Client configuration stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Server url including scheme and port, e.g. `http://10.0.2.2:3000`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Path of the socket endpoint on the server.
    #[serde(default = "default_cable_path")]
    pub cable_path: String,
    /// Reopen the socket right after a transport error.
    #[serde(default = "default_reconnect_on_error")]
    pub reconnect_on_error: bool,
    /// Timeout for REST calls in milliseconds. The sync start call has none.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Sent as the `app-version` header.
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Sent as the `Accept` header.
    #[serde(default = "default_media_type")]
    pub media_type: String,
    /// Shared guest account.
    #[serde(default = "default_guest_email")]
    pub guest_email: String,
    #[serde(default = "default_guest_password")]
    pub guest_password: String,
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_cable_path() -> String {
    "/cable".to_string()
}

fn default_reconnect_on_error() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_media_type() -> String {
    "application/airett.v1".to_string()
}

fn default_guest_email() -> String {
    "guest@mail.it".to_string()
}

fn default_guest_password() -> String {
    "fkhkwy6hcs".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_url: default_server_url(),
            cable_path: default_cable_path(),
            reconnect_on_error: default_reconnect_on_error(),
            request_timeout_ms: default_request_timeout_ms(),
            app_version: default_app_version(),
            media_type: default_media_type(),
            guest_email: default_guest_email(),
            guest_password: default_guest_password(),
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Server url normalized for joining relative paths.
    pub fn server_base(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Socket url: same host as the server, `ws` scheme, token query.
    pub fn socket_url(&self, credentials: &Credentials) -> Result<Url> {
        let base = Url::parse(&self.server_url)?;
        let scheme = match base.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(Error::Config(format!("unsupported server scheme: {other}"))),
        };
        let host = base
            .host_str()
            .ok_or_else(|| Error::Config(format!("server url has no host: {}", self.server_url)))?;
        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let mut url = Url::parse(&format!("{scheme}://{authority}"))?;
        url.set_path(&self.cable_path);
        url.query_pairs_mut()
            .append_pair("uid", &credentials.uid)
            .append_pair("access-token", &credentials.access_token)
            .append_pair("client", &credentials.client);
        Ok(url)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
