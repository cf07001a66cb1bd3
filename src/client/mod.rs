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

//! Transport layer for control-plane calls and chunk downloads.
//!
//! This module provides:
//! - `Transport` trait: abstract interface used by the chunk pipeline
//! - `HttpTransport`: HTTPS implementation with retry and timeouts
//! - `ScriptedTransport`: scripted test double running the same retry loop
//! - `BlockingTransport`: blocking calling convention over any `Transport`

pub mod http;
pub mod retry;
pub mod scripted;

use crate::error::{Error, Result};
use crate::types::request::{ChunkDownloadRequest, RestRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;

pub use http::{HttpClientConfig, HttpTransport};
pub use retry::{Budget, RetryPolicy};
pub use scripted::{ScriptedResponse, ScriptedTransport};

/// Body of a chunk download, delivered incrementally.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Abstract interface for the two kinds of traffic the pipeline issues.
///
/// Implementations own retry and timeout handling; callers only see the
/// final outcome of an operation.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Issue a JSON control-plane request and return the raw response body.
    async fn send_json(
        &self,
        request: &RestRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Bytes>;

    /// Start a chunk download and return its body stream once the response
    /// headers have arrived.
    async fn fetch_bytes(
        &self,
        request: &ChunkDownloadRequest,
        cancel_token: &CancellationToken,
    ) -> Result<ByteStream>;
}

impl dyn Transport {
    /// Issue a control-plane request and deserialize the typed response.
    pub async fn call<T: DeserializeOwned>(
        &self,
        request: &RestRequest,
        cancel_token: &CancellationToken,
    ) -> Result<T> {
        let body = self.send_json(request, cancel_token).await?;
        serde_json::from_slice(&body).map_err(|e| {
            Error::MalformedResponse(format!("{} returned invalid JSON: {}", request.uri, e))
        })
    }
}

/// Blocking facade over a [`Transport`].
///
/// Must not be used from inside an async context: every method blocks the
/// current thread on the given runtime.
#[derive(Debug, Clone)]
pub struct BlockingTransport {
    inner: Arc<dyn Transport>,
    runtime_handle: tokio::runtime::Handle,
}

impl BlockingTransport {
    pub fn new(inner: Arc<dyn Transport>, runtime_handle: tokio::runtime::Handle) -> Self {
        Self {
            inner,
            runtime_handle,
        }
    }

    /// Blocking variant of `call` on a `dyn` [`Transport`].
    pub fn call<T: DeserializeOwned>(&self, request: &RestRequest) -> Result<T> {
        let cancel_token = CancellationToken::new();
        self.runtime_handle
            .block_on(self.inner.call(request, &cancel_token))
    }

    /// Blocking variant of [`Transport::fetch_bytes`]; the body is exposed as [`Read`].
    pub fn fetch_bytes(
        &self,
        request: &ChunkDownloadRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Box<dyn Read + Send>> {
        let stream = self
            .runtime_handle
            .block_on(self.inner.fetch_bytes(request, cancel_token))?;
        let reader = SyncIoBridge::new_with_handle(
            StreamReader::new(stream),
            self.runtime_handle.clone(),
        );
        Ok(Box::new(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Renewed {
        #[serde(rename = "sessionToken")]
        session_token: String,
    }

    #[tokio::test]
    async fn test_call_deserializes_typed_response() {
        let scripted = ScriptedTransport::new();
        scripted.push(
            "https://acct.example.com/session/token-request",
            ScriptedResponse::body(r#"{"sessionToken": "fresh"}"#),
        );
        let transport: Arc<dyn Transport> = Arc::new(scripted);

        let request = RestRequest::post(
            "https://acct.example.com/session/token-request",
            serde_json::json!({"oldSessionToken": "stale", "requestType": "RENEW"}),
        );
        let renewed: Renewed = transport
            .call(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(renewed.session_token, "fresh");
    }

    #[tokio::test]
    async fn test_call_rejects_malformed_json() {
        let scripted = ScriptedTransport::new();
        scripted.push("https://acct.example.com/q", ScriptedResponse::body("{not json"));
        let transport: Arc<dyn Transport> = Arc::new(scripted);

        let result: Result<Renewed> = transport
            .call(&RestRequest::get("https://acct.example.com/q"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_blocking_transport() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let scripted = ScriptedTransport::new();
        scripted.push(
            "https://acct.example.com/session/token-request",
            ScriptedResponse::body(r#"{"sessionToken": "blocking"}"#),
        );
        scripted.push(
            "https://stage.example.com/chunk0",
            ScriptedResponse::parts(vec![r#"["a","b"],"#, r#"["c",null]"#]),
        );
        let blocking = BlockingTransport::new(Arc::new(scripted), runtime.handle().clone());

        let renewed: Renewed = blocking
            .call(&RestRequest::get(
                "https://acct.example.com/session/token-request",
            ))
            .unwrap();
        assert_eq!(renewed.session_token, "blocking");

        let request = ChunkDownloadRequest::new(
            "https://stage.example.com/chunk0",
            &crate::types::DownloadAuth::default(),
        );
        let mut reader = blocking
            .fetch_bytes(&request, &CancellationToken::new())
            .unwrap();
        let mut body = String::new();
        reader.read_to_string(&mut body).unwrap();
        assert_eq!(body, r#"["a","b"],["c",null]"#);
    }
}
