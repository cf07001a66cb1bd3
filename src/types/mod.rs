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

//! Type definitions for the chunk pipeline.
//!
//! This module contains data structures organized by domain:
//! - `chunk`: pipeline configuration, chunk descriptors and download auth
//! - `manifest`: the chunk-related part of a query execution response
//! - `request`: control-plane and storage download request descriptions

pub mod chunk;
pub mod manifest;
pub mod request;

// Re-export commonly used types
pub use chunk::{ChunkDescriptor, DownloadAuth, PrefetchConfig};
pub use manifest::{ColumnMeta, ExecResponseChunk, ResultChunkManifest};
pub use request::{ChunkDownloadRequest, RestRequest};
