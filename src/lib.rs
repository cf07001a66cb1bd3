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

//! Chunked result retrieval for a cloud analytic database driver.
//!
//! A query execution response lists the result set as many remote chunks.
//! This crate downloads those chunks ahead of consumption, decodes them into
//! reusable row/column buffers and hands them to the caller in order, with a
//! bounded number of concurrent downloads and buffers.
//!
//! ## Overview
//!
//! - [`ChunkPrefetcher`] - Ordered, bounded prefetch over all chunks of a result set
//! - [`ChunkBuffer`] - Decoded rows and columns of one chunk, reused across chunks
//! - [`Transport`] - Control-plane calls and storage downloads with retry and timeouts
//! - [`parse_rows`] - Incremental decoder for bracketless row-array chunk bodies
//!
//! ## Example
//!
//! ```ignore
//! use snowflake_chunk_pipeline::{
//!     ChunkPrefetcher, HttpClientConfig, HttpTransport, PrefetchConfig, ResultChunkManifest,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let manifest: ResultChunkManifest = serde_json::from_slice(&response_data)?;
//! let transport = Arc::new(HttpTransport::new(HttpClientConfig::default())?);
//! let config = PrefetchConfig::from_session_parameters(&session_parameters)?;
//!
//! let mut prefetcher = ChunkPrefetcher::from_manifest(
//!     &manifest,
//!     transport,
//!     config,
//!     &CancellationToken::new(),
//!     tokio::runtime::Handle::current(),
//! )?;
//! while let Some(chunk) = prefetcher.next_chunk().await? {
//!     for row in 0..chunk.row_count() {
//!         let first = chunk.cell(row, 0)?;
//!     }
//! }
//! ```
//!
//! ## Configuration Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `CLIENT_PREFETCH_THREADS` | 4 | Chunks downloaded ahead of consumption |
//! | `PrefetchConfig::download_timeout` | 1 h | Overall budget per chunk download |
//! | `PrefetchConfig::download_attempt_timeout` | 16 s | Budget per HTTP attempt |
//! | `PrefetchConfig::speed_threshold_mbps` | 0.1 | Slow download warning threshold |

pub mod client;
pub mod error;
pub mod logging;
pub mod reader;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use reader::{parse_rows, BlockingChunkReader, BufferState, ChunkBuffer, ChunkPrefetcher};

// Re-export client types for advanced users
pub use client::{
    BlockingTransport, HttpClientConfig, HttpTransport, RetryPolicy, ScriptedResponse,
    ScriptedTransport, Transport,
};

// Re-export configuration types
pub use logging::{init_logging, LogConfig};
pub use types::{
    ChunkDescriptor, ChunkDownloadRequest, DownloadAuth, PrefetchConfig, RestRequest,
    ResultChunkManifest,
};
