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

//! ChunkDownloader for fetching and decoding one chunk.
//!
//! This module handles downloading chunk bodies from storage URLs,
//! including header handling, speed monitoring and streaming the body
//! through the row parser into a reusable [`ChunkBuffer`].

use crate::client::{ByteStream, Transport};
use crate::error::{Error, Result};
use crate::reader::chunked::chunk_buffer::ChunkBuffer;
use crate::reader::chunked::stream_parser::parse_rows;
use crate::types::request::ChunkDownloadRequest;
use futures::{StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything one download needs: the checked-out buffer, the storage
/// request and the result set's cancellation signal.
#[derive(Debug)]
pub struct DownloadContext {
    pub chunk_index: usize,
    pub buffer: ChunkBuffer,
    pub request: ChunkDownloadRequest,
    pub cancel_token: CancellationToken,
}

/// Result of one download, handing the buffer back to its slot.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub chunk_index: usize,
    /// `None` only if the decoding task died and took the buffer with it.
    pub buffer: Option<ChunkBuffer>,
    pub result: Result<()>,
}

/// Downloads chunk bodies and decodes them in place.
///
/// Handles:
/// - GET to the storage URL with the chunk's auth headers
/// - Incremental row decoding on a blocking thread
/// - Download speed monitoring
#[derive(Debug)]
pub struct ChunkDownloader {
    transport: Arc<dyn Transport>,
    runtime_handle: tokio::runtime::Handle,
    speed_threshold_mbps: f64,
}

impl ChunkDownloader {
    /// Create a new chunk downloader.
    ///
    /// # Arguments
    /// * `transport` - Transport used for the storage GET
    /// * `runtime_handle` - Runtime the body stream is polled on while decoding
    /// * `speed_threshold_mbps` - Log warning if speed falls below this (MB/s)
    pub fn new(
        transport: Arc<dyn Transport>,
        runtime_handle: tokio::runtime::Handle,
        speed_threshold_mbps: f64,
    ) -> Self {
        Self {
            transport,
            runtime_handle,
            speed_threshold_mbps,
        }
    }

    /// Download one chunk into the context's buffer.
    ///
    /// Never fails as a whole: errors are reported in the outcome next to
    /// the buffer so the slot can be reused.
    pub async fn download(&self, context: DownloadContext) -> DownloadOutcome {
        let DownloadContext {
            chunk_index,
            mut buffer,
            request,
            cancel_token,
        } = context;
        let start = Instant::now();

        debug!(
            "Downloading chunk {} into slot {} from {}",
            chunk_index,
            buffer.slot(),
            request.uri
        );

        let stream = match self.transport.fetch_bytes(&request, &cancel_token).await {
            Ok(stream) => stream,
            Err(e) => {
                buffer.mark_failed();
                return DownloadOutcome {
                    chunk_index,
                    buffer: Some(buffer),
                    result: Err(e),
                };
            }
        };

        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        // Ending the stream on cancellation unblocks the decoder.
        let stream: ByteStream = Box::pin(
            stream
                .inspect_ok(move |part| {
                    counter.fetch_add(part.len() as u64, Ordering::Relaxed);
                })
                .take_until(cancel_token.clone().cancelled_owned()),
        );

        let handle = self.runtime_handle.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let reader = SyncIoBridge::new_with_handle(StreamReader::new(stream), handle);
            let result = parse_rows(reader, &mut buffer);
            (buffer, result)
        })
        .await;

        let (buffer, result) = match joined {
            Ok(decoded) => decoded,
            Err(e) => {
                return DownloadOutcome {
                    chunk_index,
                    buffer: None,
                    result: Err(Error::Internal(format!(
                        "Decoding task for chunk {} failed: {}",
                        chunk_index, e
                    ))),
                };
            }
        };

        let result = match result {
            Err(_) if cancel_token.is_cancelled() => Err(Error::Cancelled),
            other => other,
        };

        if result.is_ok() {
            self.report_speed(chunk_index, received.load(Ordering::Relaxed), start);
        }

        DownloadOutcome {
            chunk_index,
            buffer: Some(buffer),
            result,
        }
    }

    fn report_speed(&self, chunk_index: usize, bytes: u64, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        let size_mb = bytes as f64 / 1024.0 / 1024.0;
        if elapsed <= 0.0 {
            return;
        }
        let speed_mbps = size_mb / elapsed;

        debug!(
            "Downloaded chunk {}: {:.2} MB in {:.2}s ({:.2} MB/s)",
            chunk_index, size_mb, elapsed, speed_mbps
        );

        if speed_mbps < self.speed_threshold_mbps {
            warn!(
                "Chunk download slower than threshold: {:.2} MB/s (threshold: {:.2} MB/s)",
                speed_mbps, self.speed_threshold_mbps
            );
        }
    }
}
