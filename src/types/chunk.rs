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

//! Chunk pipeline types: configuration, chunk descriptors and download auth.
//!
//! These types are consumed by `ChunkPrefetcher` and the chunk downloader.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Session parameter carrying the desired number of concurrent chunk downloads.
pub const PREFETCH_THREADS_PARAMETER: &str = "CLIENT_PREFETCH_THREADS";

/// Default number of prefetch slots when the session does not override it.
pub const DEFAULT_PREFETCH_THREADS: usize = 4;

/// Overall budget for one chunk download, all retries included.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Budget for a single HTTP attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(16);

/// Configuration for the chunk prefetch pipeline.
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// Number of chunks downloaded ahead of consumption (the slot count before clamping).
    pub prefetch_threads: usize,
    /// Overall timeout for one chunk download.
    pub download_timeout: Duration,
    /// Per-attempt timeout for one chunk download.
    pub download_attempt_timeout: Duration,
    /// Log warning if download speed falls below this threshold (MB/s).
    pub speed_threshold_mbps: f64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            prefetch_threads: DEFAULT_PREFETCH_THREADS,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            download_attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            speed_threshold_mbps: 0.1,
        }
    }
}

impl PrefetchConfig {
    /// Build a config from session parameters.
    ///
    /// Only `CLIENT_PREFETCH_THREADS` is read; an absent value keeps the default.
    /// A value that is not an integer, or is below 1, is rejected rather than
    /// silently replaced.
    pub fn from_session_parameters(parameters: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = parameters.get(PREFETCH_THREADS_PARAMETER) {
            config.prefetch_threads = parse_prefetch_threads(raw)?;
        }
        Ok(config)
    }

    /// Check that the configured values can drive a pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.prefetch_threads < 1 {
            return Err(Error::Config(format!(
                "{} must be at least 1, got {}",
                PREFETCH_THREADS_PARAMETER, self.prefetch_threads
            )));
        }
        if self.download_attempt_timeout.is_zero() {
            return Err(Error::Config(
                "download attempt timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Slot count for a result set of `chunk_count` chunks.
    pub fn slot_count(&self, chunk_count: usize) -> usize {
        self.prefetch_threads.min(chunk_count)
    }
}

fn parse_prefetch_threads(raw: &str) -> Result<usize> {
    let value: i64 = raw.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{} is not an integer: {:?}",
            PREFETCH_THREADS_PARAMETER, raw
        ))
    })?;
    if value < 1 {
        return Err(Error::Config(format!(
            "{} must be at least 1, got {}",
            PREFETCH_THREADS_PARAMETER, value
        )));
    }
    usize::try_from(value).map_err(|_| {
        Error::Config(format!(
            "{} out of range: {}",
            PREFETCH_THREADS_PARAMETER, value
        ))
    })
}

/// Immutable description of one result chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position of this chunk in the result set (defines delivery order).
    pub index: usize,
    /// Storage URL of the chunk body.
    pub url: String,
    /// Number of rows the server reported for this chunk.
    pub row_count: usize,
    /// Number of columns in every row.
    pub column_count: usize,
}

/// Auth material shared by every chunk download of one result set.
#[derive(Clone, Default)]
pub struct DownloadAuth {
    /// Short-lived key authorizing the storage downloads (`qrmk`).
    pub qrmk: Option<String>,
    /// Headers the server asked to be sent with every chunk request.
    pub chunk_headers: HashMap<String, String>,
}

impl std::fmt::Debug for DownloadAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadAuth")
            .field("qrmk", &self.qrmk.as_ref().map(|_| "<redacted>"))
            .field("chunk_headers", &self.chunk_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
