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

//! Scripted [`Transport`] for deterministic tests.
//!
//! Each URI owns a queue of [`ScriptedResponse`]s; every attempt pops the next
//! one. Once only a single response is left it is replayed for every further
//! attempt. Attempts run through the same retry loop as [`HttpTransport`], so
//! retry, timeout and cancellation behave exactly as in production.
//!
//! [`HttpTransport`]: super::HttpTransport

use crate::client::retry::{execute_with_retry, Budget, RetryPolicy};
use crate::client::{ByteStream, Transport};
use crate::error::{Error, Result};
use crate::types::request::{ChunkDownloadRequest, RestRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of one scripted attempt.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Successful response whose body arrives as the given pieces.
    Body(Vec<Bytes>),
    /// Wait, then behave like the wrapped response.
    Delayed(Duration, Box<ScriptedResponse>),
    /// Non-success HTTP status.
    Status(u16),
    /// Connection-level failure.
    TransportError(String),
    /// Never answer.
    Hang,
}

impl ScriptedResponse {
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self::Body(vec![body.into()])
    }

    pub fn parts<B: Into<Bytes>>(parts: Vec<B>) -> Self {
        Self::Body(parts.into_iter().map(Into::into).collect())
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// A request observed by the scripted transport.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight count when the download body is dropped.
struct InFlightGuard(Arc<Counters>);

impl InFlightGuard {
    fn enter(counters: &Arc<Counters>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(counters))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport test double returning scripted responses per URI.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    attempts: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<RecordedRequest>>,
    counters: Arc<Counters>,
    retry_policy: RetryPolicy,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::with_retry_policy(RetryPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        })
    }

    pub fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
        Self {
            retry_policy,
            ..Default::default()
        }
    }

    /// Queue a response for `uri`.
    pub fn push(&self, uri: impl Into<String>, response: ScriptedResponse) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(uri.into())
            .or_default()
            .push_back(response);
    }

    /// Number of attempts made against `uri`.
    pub fn attempts(&self, uri: &str) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(uri)
            .copied()
            .unwrap_or(0)
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Downloads currently open (attempt running or body not yet dropped).
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open downloads.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, uri: &str, headers: Vec<(String, String)>) -> ScriptedResponse {
        *self
            .attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(uri.to_string())
            .or_insert(0) += 1;
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                uri: uri.to_string(),
                headers,
            });

        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        match scripts.get_mut(uri) {
            Some(queue) if queue.len() > 1 => {
                queue.pop_front().unwrap_or(ScriptedResponse::Status(404))
            }
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or(ScriptedResponse::Status(404)),
            None => ScriptedResponse::Status(404),
        }
    }

    async fn play(response: ScriptedResponse) -> Result<Vec<Bytes>> {
        let mut response = response;
        loop {
            match response {
                ScriptedResponse::Body(parts) => return Ok(parts),
                ScriptedResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                ScriptedResponse::Status(status) if status == 401 || status == 403 => {
                    return Err(Error::Unauthorized { status })
                }
                ScriptedResponse::Status(status) => {
                    return Err(Error::Http {
                        status,
                        body: String::new(),
                    })
                }
                ScriptedResponse::TransportError(message) => {
                    return Err(Error::Transport(message))
                }
                ScriptedResponse::Hang => return std::future::pending().await,
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_json(
        &self,
        request: &RestRequest,
        cancel_token: &CancellationToken,
    ) -> Result<Bytes> {
        let budget = Budget {
            overall: request.timeout,
            attempt: request.attempt_timeout,
        };
        let headers: Vec<(String, String)> = request
            .authorization()
            .map(|auth| vec![("Authorization".to_string(), auth)])
            .unwrap_or_default();

        let parts = execute_with_retry(
            &request.uri,
            &self.retry_policy,
            budget,
            cancel_token,
            |_| Self::play(self.next_response(&request.uri, headers.clone())),
        )
        .await?;
        Ok(parts.concat().into())
    }

    async fn fetch_bytes(
        &self,
        request: &ChunkDownloadRequest,
        cancel_token: &CancellationToken,
    ) -> Result<ByteStream> {
        let guard = InFlightGuard::enter(&self.counters);
        let budget = Budget {
            overall: Some(request.timeout),
            attempt: request.attempt_timeout,
        };

        let parts = execute_with_retry(
            &request.uri,
            &self.retry_policy,
            budget,
            cancel_token,
            |_| Self::play(self.next_response(&request.uri, request.headers())),
        )
        .await?;

        let stream = futures::stream::iter(parts).map(move |part| {
            let _open = &guard;
            Ok::<Bytes, std::io::Error>(part)
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn download(uri: &str) -> ChunkDownloadRequest {
        ChunkDownloadRequest::new(uri, &Default::default())
            .with_timeouts(Duration::from_secs(60), Duration::from_secs(5))
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        stream
            .try_fold(Vec::new(), |mut acc, part| async move {
                acc.extend_from_slice(&part);
                Ok(acc)
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_retry_then_success() {
        let transport = ScriptedTransport::new();
        transport.push("u", ScriptedResponse::TransportError("reset".into()));
        transport.push("u", ScriptedResponse::Status(503));
        transport.push("u", ScriptedResponse::body("payload"));

        let stream = transport
            .fetch_bytes(&download("u"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(collect(stream).await, b"payload");
        assert_eq!(transport.attempts("u"), 3);
        assert_eq!(transport.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_unknown_uri_is_not_found() {
        let transport = ScriptedTransport::new();
        let result = transport
            .fetch_bytes(&download("missing"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Http { status: 404, .. })));
        assert_eq!(transport.attempts("missing"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_unauthorized_not_retried() {
        let transport = ScriptedTransport::new();
        transport.push("u", ScriptedResponse::Status(403));

        let result = transport
            .fetch_bytes(&download("u"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Unauthorized { status: 403 })));
        assert_eq!(transport.attempts("u"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_hang_times_out() {
        let transport = ScriptedTransport::new();
        transport.push("u", ScriptedResponse::Hang);

        let result = transport
            .fetch_bytes(&download("u"), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert!(transport.attempts("u") > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tracks_open_bodies() {
        let transport = ScriptedTransport::new();
        transport.push("a", ScriptedResponse::body("1"));
        transport.push("b", ScriptedResponse::body("2"));

        let cancel = CancellationToken::new();
        let first = transport.fetch_bytes(&download("a"), &cancel).await.unwrap();
        let second = transport.fetch_bytes(&download("b"), &cancel).await.unwrap();
        assert_eq!(transport.in_flight(), 2);

        drop(first);
        assert_eq!(transport.in_flight(), 1);
        drop(second);
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_recorded_headers() {
        let transport = ScriptedTransport::new();
        transport.push("u", ScriptedResponse::body(""));
        let auth = crate::types::DownloadAuth {
            qrmk: Some("k".into()),
            chunk_headers: HashMap::new(),
        };
        let request = ChunkDownloadRequest::new("u", &auth);
        transport
            .fetch_bytes(&request, &CancellationToken::new())
            .await
            .unwrap();

        let recorded = transport.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].headers.len(), 2);
    }
}
