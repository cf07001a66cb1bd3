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

//! Chunked result retrieval from cloud storage.
//!
//! This module provides:
//! - `ChunkPrefetcher`: Main orchestrator for ordered, bounded prefetch
//! - `ChunkDownloader`: Downloads and decodes one chunk body
//! - `ChunkBuffer`: Reusable decoded storage for one chunk
//! - `parse_rows`: Incremental decoder for bracketless row-array bodies

pub mod chunk_buffer;
pub mod downloader;
pub mod prefetch;
pub mod stream_parser;

pub use chunk_buffer::{BufferState, ChunkBuffer};
pub use downloader::{ChunkDownloader, DownloadContext, DownloadOutcome};
pub use prefetch::ChunkPrefetcher;
pub use stream_parser::parse_rows;
