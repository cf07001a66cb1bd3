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

//! HTTPS transport implementation.
//!
//! This module provides a low-level HTTP client with:
//! - Connection pooling
//! - Retry with exponential backoff inside a per-operation timeout budget
//! - Session token authentication for control-plane calls
//! - Header-authorized storage downloads with streamed bodies

use crate::client::retry::{execute_with_retry, Budget, RetryPolicy};
use crate::client::{ByteStream, Transport};
use crate::error::{Error, Result};
use crate::types::request::{ChunkDownloadRequest, RestRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Longest gap allowed between two reads of a response body.
    pub read_timeout: Duration,
    /// Backoff between attempts.
    pub retry_policy: RetryPolicy,
    /// Maximum number of idle connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(16),
            read_timeout: Duration::from_secs(16),
            retry_policy: RetryPolicy::default(),
            max_connections_per_host: 20,
            user_agent: format!("snowflake-chunk-pipeline/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTPS client for control-plane calls and chunk downloads.
///
/// This client handles:
/// - Connection pooling (via reqwest)
/// - Retry with exponential backoff for transient failures
/// - Transparent gzip decoding of chunk bodies
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpClientConfig,
}

impl HttpTransport {
    /// Creates a new HTTP transport with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    async fn send_json_once(&self, request: &RestRequest) -> Result<Bytes> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.uri)
            .header(ACCEPT, "application/json");

        if let Some(authorization) = request.authorization() {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        if let Some(ref body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        response.bytes().await.map_err(map_reqwest_error)
    }

    async fn fetch_once(&self, request: &ChunkDownloadRequest) -> Result<Response> {
        let mut builder = self.client.request(Method::GET, &request.uri);
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        check_status(response).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_json(
        &self,
        request: &RestRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Bytes> {
        let label = format!("{} {}", request.method, request.uri);
        let budget = Budget {
            overall: request.timeout,
            attempt: request.attempt_timeout,
        };

        execute_with_retry(
            &label,
            &self.config.retry_policy,
            budget,
            cancel_token,
            |_| self.send_json_once(request),
        )
        .await
    }

    async fn fetch_bytes(
        &self,
        request: &ChunkDownloadRequest,
        cancel_token: &CancellationToken,
    ) -> Result<ByteStream> {
        let label = format!("GET {}", request.uri);
        let budget = Budget {
            overall: Some(request.timeout),
            attempt: request.attempt_timeout,
        };

        let response = execute_with_retry(
            &label,
            &self.config.retry_policy,
            budget,
            cancel_token,
            |_| self.fetch_once(request),
        )
        .await?;

        debug!(
            "Chunk response from {}: content_length={:?}",
            request.uri,
            response.content_length()
        );

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::other(e.to_string()));
        Ok(Box::pin(stream))
    }
}

/// Turn a non-success response into the matching error.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if is_auth_status(status) {
        return Err(Error::Unauthorized {
            status: status.as_u16(),
        });
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Http {
        status: status.as_u16(),
        body,
    })
}

fn is_auth_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

fn map_reqwest_error(error: reqwest::Error) -> Error {
    if error.is_builder() {
        Error::InvalidRequest(error.to_string())
    } else if error.is_timeout() {
        Error::Timeout {
            elapsed: Duration::ZERO,
            message: error.to_string(),
        }
    } else {
        Error::Transport(error.to_string())
    }
}
