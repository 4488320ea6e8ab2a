// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP collaborator: the REST calls the mirror makes to the server.
//!
//! Every call goes through [`ServerApi::send`] and yields an [`ApiResponse`]
//! whatever the status; [`ApiResponse::check`] turns a status of 300 or more
//! into [`ApiError::Status`] carrying the first server error message.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use lm_core::{Credentials, EventRecord, TreeLoadRecord, LOAD_TREE_EVENTS};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::Config;

/// Error type for server calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Network(String),

    /// The server answered with a failure status.
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for server calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Boxed future returned by [`ServerApi::send`].
pub type ApiFuture<'a> = Pin<Box<dyn Future<Output = ApiResult<ApiResponse>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// One REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the server url.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Sent as the five token headers.
    pub credentials: Option<Credentials>,
    /// Wait for the answer however long it takes.
    pub no_timeout: bool,
}

/// Guest sign-in goes straight to the auth route.
pub const AUTH_SIGN_IN: &str = "auth/sign_in";

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            credentials: None,
            no_timeout: false,
        }
    }

    fn authed(mut self, credentials: &Credentials) -> Self {
        self.credentials = Some(credentials.clone());
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// `POST <route>` with email and password.
    pub fn sign_in(route: &str, email: &str, password: &str, server_url: &str) -> Self {
        ApiRequest::new(Method::Post, route).body(json!({
            "email": email,
            "password": password,
            "server_ip": server_url,
        }))
    }

    /// `POST sign_in` with stored token headers.
    pub fn sign_in_stored(credentials: &Credentials, server_url: &str) -> Self {
        ApiRequest::new(Method::Post, "sign_in")
            .authed(credentials)
            .body(json!({ "server_ip": server_url }))
    }

    /// `DELETE auth/sign_out`
    pub fn sign_out(credentials: &Credentials) -> Self {
        ApiRequest::new(Method::Delete, "auth/sign_out")
            .authed(credentials)
            .body(json!({}))
    }

    /// `GET patients`
    pub fn patients(credentials: &Credentials) -> Self {
        ApiRequest::new(Method::Get, "patients").authed(credentials)
    }

    /// `GET patients/:id`
    pub fn patient(credentials: &Credentials, patient_id: &str) -> Self {
        ApiRequest::new(Method::Get, format!("patients/{patient_id}")).authed(credentials)
    }

    /// `POST synchronizations`; blocks until the server has started both legs.
    pub fn start_synchronization(credentials: &Credentials, patient_id: &str) -> Self {
        let mut req = ApiRequest::new(Method::Post, "synchronizations")
            .authed(credentials)
            .body(json!({ "patient_id": patient_id }));
        req.no_timeout = true;
        req
    }

    /// `GET synchronizations?patient_id=`
    pub fn synchronizations(credentials: &Credentials, patient_id: &str) -> Self {
        let mut req = ApiRequest::new(Method::Get, "synchronizations").authed(credentials);
        req.query
            .push(("patient_id".to_string(), patient_id.to_string()));
        req
    }

    /// `GET patients/:id/queued_synchronizables`
    pub fn queued_synchronizables(credentials: &Credentials, patient_id: &str) -> Self {
        ApiRequest::new(
            Method::Get,
            format!("patients/{patient_id}/queued_synchronizables"),
        )
        .authed(credentials)
    }

    /// `POST <endpoint>` with a session event record.
    pub fn event(credentials: &Credentials, endpoint: &str, record: &EventRecord) -> ApiResult<Self> {
        let body = serde_json::to_value(record).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(ApiRequest::new(Method::Post, endpoint)
            .authed(credentials)
            .body(body))
    }

    /// `POST load_tree_events`
    pub fn tree_loaded(credentials: &Credentials, record: &TreeLoadRecord) -> ApiResult<Self> {
        let body = serde_json::to_value(record).map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(ApiRequest::new(Method::Post, LOAD_TREE_EVENTS)
            .authed(credentials)
            .body(body))
    }
}

/// A server answer, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
}

impl ApiResponse {
    pub fn new(status: u16, data: Value) -> Self {
        ApiResponse {
            status,
            data,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status < 300
    }

    /// First server error message, or the whole body when there is none.
    pub fn error_message(&self) -> String {
        match self.data.get("errors") {
            Some(Value::Array(errors)) => match errors.first() {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "[]".to_string(),
            },
            Some(other) => other.to_string(),
            None => self.data.to_string(),
        }
    }

    /// Passes successful responses through; fails on status 300 and above.
    pub fn check(self) -> ApiResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status {
                status: self.status,
                message: self.error_message(),
            })
        }
    }

    /// Decodes the body.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Token set carried in the response headers.
    pub fn credentials(&self) -> Option<Credentials> {
        let header = |name: &str| self.headers.get(name).cloned();
        Some(Credentials {
            access_token: header("access-token")?,
            client: header("client")?,
            expiry: header("expiry").unwrap_or_default(),
            token_type: header("token-type").unwrap_or_default(),
            uid: header("uid")?,
        })
    }
}

/// The REST surface of the server.
pub trait ServerApi: Send + Sync {
    fn send(&self, req: ApiRequest) -> ApiFuture<'_>;
}

/// reqwest-backed [`ServerApi`].
pub struct HttpApi {
    base: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpApi {
    pub fn new(config: &Config) -> crate::Result<Self> {
        let base = config.server_base()?;
        let mut headers = reqwest::header::HeaderMap::new();
        let pairs = [
            ("accept", config.media_type.as_str()),
            ("pragma", "no-cache"),
            ("cache-control", "no-store"),
            ("app-version", config.app_version.as_str()),
        ];
        for (name, value) in pairs {
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| crate::Error::Config(format!("invalid {name} header: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| crate::Error::Config(e.to_string()))?;

        Ok(HttpApi {
            base,
            client,
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }
}

impl ServerApi for HttpApi {
    fn send(&self, req: ApiRequest) -> ApiFuture<'_> {
        Box::pin(async move {
            let url = self
                .base
                .join(&req.path)
                .map_err(|e| ApiError::Network(e.to_string()))?;
            let method = match req.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Delete => reqwest::Method::DELETE,
            };
            debug!(%method, path = %req.path, "request");

            let mut builder = self.client.request(method, url);
            if !req.query.is_empty() {
                builder = builder.query(&req.query);
            }
            if !req.no_timeout {
                builder = builder.timeout(self.timeout);
            }
            if let Some(creds) = &req.credentials {
                for (name, value) in creds.headers() {
                    builder = builder.header(name, value);
                }
            }
            if let Some(body) = &req.body {
                builder = builder.json(body);
            }

            let resp = builder
                .send()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;

            let status = resp.status().as_u16();
            let headers = resp
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let text = resp
                .text()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            let data = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };

            Ok(ApiResponse {
                status,
                data,
                headers,
            })
        })
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
