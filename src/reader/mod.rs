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

//! Chunk readers for fetching query results from storage.
//!
//! This module provides:
//! - `chunked`: the prefetch pipeline over remote result chunks
//! - `BlockingChunkReader`: blocking wrapper for synchronous consumers

pub mod chunked;

use crate::error::Result;

pub use chunked::{
    parse_rows, BufferState, ChunkBuffer, ChunkDownloader, ChunkPrefetcher, DownloadContext,
    DownloadOutcome,
};

/// Wrapper for [`ChunkPrefetcher`] that blocks on a runtime handle.
///
/// Must not be used from a thread that is already driving the runtime.
#[derive(Debug)]
pub struct BlockingChunkReader {
    prefetcher: ChunkPrefetcher,
    runtime_handle: tokio::runtime::Handle,
}

impl BlockingChunkReader {
    pub fn new(prefetcher: ChunkPrefetcher, runtime_handle: tokio::runtime::Handle) -> Self {
        Self {
            prefetcher,
            runtime_handle,
        }
    }

    /// Blocking variant of [`ChunkPrefetcher::next_chunk`].
    pub fn next_chunk(&mut self) -> Result<Option<&ChunkBuffer>> {
        self.runtime_handle.block_on(self.prefetcher.next_chunk())
    }

    pub fn cancel(&self) {
        self.prefetcher.cancel();
    }

    pub fn prefetcher(&self) -> &ChunkPrefetcher {
        &self.prefetcher
    }
}
