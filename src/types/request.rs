// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Request descriptions handed to a [`Transport`](crate::client::Transport).
//!
//! - [`RestRequest`]: a JSON control-plane call authorized by the session token
//! - [`ChunkDownloadRequest`]: a bulk GET of one chunk body from cloud storage

use crate::types::chunk::{DownloadAuth, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT};
use reqwest::Method;
use std::collections::HashMap;
use std::time::Duration;

/// Header naming the server-side encryption algorithm for storage downloads.
pub const SSE_C_ALGORITHM_HEADER: &str = "x-amz-server-side-encryption-customer-algorithm";
/// Header carrying the `qrmk` key for storage downloads.
pub const SSE_C_KEY_HEADER: &str = "x-amz-server-side-encryption-customer-key";
/// The only algorithm the storage layer uses.
pub const SSE_C_AES: &str = "AES256";

/// A JSON request/response exchange with the service.
#[derive(Clone)]
pub struct RestRequest {
    pub method: Method,
    pub uri: String,
    pub body: Option<serde_json::Value>,
    /// Session token sent as `Authorization: Snowflake Token="..."`.
    pub session_token: Option<String>,
    /// Budget for all attempts combined. `None` means unbounded.
    pub timeout: Option<Duration>,
    /// Budget for one attempt.
    pub attempt_timeout: Duration,
}

impl RestRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            body: None,
            session_token: None,
            timeout: None,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::POST, uri);
        request.body = Some(body);
        request
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Value of the `Authorization` header, if a session token is set.
    pub fn authorization(&self) -> Option<String> {
        self.session_token
            .as_ref()
            .map(|token| format!("Snowflake Token=\"{}\"", token))
    }
}

impl std::fmt::Debug for RestRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

/// A GET of one chunk body from cloud storage.
#[derive(Clone)]
pub struct ChunkDownloadRequest {
    pub uri: String,
    pub qrmk: Option<String>,
    pub chunk_headers: HashMap<String, String>,
    /// Budget for all attempts combined.
    pub timeout: Duration,
    /// Budget for one attempt.
    pub attempt_timeout: Duration,
}

impl ChunkDownloadRequest {
    pub fn new(uri: impl Into<String>, auth: &DownloadAuth) -> Self {
        Self {
            uri: uri.into(),
            qrmk: auth.qrmk.clone(),
            chunk_headers: auth.chunk_headers.clone(),
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, timeout: Duration, attempt_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Headers to send with the download.
    ///
    /// A server-provided header set is sent as is. Without one, the `qrmk`
    /// is sent as the server-side encryption customer key.
    pub fn headers(&self) -> Vec<(String, String)> {
        if !self.chunk_headers.is_empty() {
            return self
                .chunk_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        match &self.qrmk {
            Some(qrmk) => vec![
                (SSE_C_ALGORITHM_HEADER.to_string(), SSE_C_AES.to_string()),
                (SSE_C_KEY_HEADER.to_string(), qrmk.clone()),
            ],
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for ChunkDownloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDownloadRequest")
            .field("uri", &self.uri)
            .field("timeout", &self.timeout)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}
