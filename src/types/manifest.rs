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

//! Query result manifest types.
//!
//! These map the part of the query execution response `data` object that
//! describes where the result chunks live and how to fetch them.

use crate::types::chunk::{ChunkDescriptor, DownloadAuth};
use serde::Deserialize;
use std::collections::HashMap;

/// Chunk-related fields of a query execution response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultChunkManifest {
    /// Column metadata; only its length matters to the pipeline.
    #[serde(default)]
    pub rowtype: Vec<ColumnMeta>,
    /// Remote chunks, in result order.
    #[serde(default)]
    pub chunks: Vec<ExecResponseChunk>,
    /// Short-lived key for the chunk downloads.
    #[serde(default)]
    pub qrmk: Option<String>,
    /// Headers to send with every chunk download.
    #[serde(default)]
    pub chunk_headers: Option<HashMap<String, String>>,
}

/// Column metadata entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub nullable: bool,
}

/// A single remote chunk reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResponseChunk {
    pub url: String,
    pub row_count: usize,
    #[serde(default)]
    pub uncompressed_size: Option<u64>,
    #[serde(default)]
    pub compressed_size: Option<u64>,
}

impl ResultChunkManifest {
    /// Number of columns in every row.
    pub fn column_count(&self) -> usize {
        self.rowtype.len()
    }

    /// Ordered chunk descriptors, indexed by position in `chunks`.
    pub fn descriptors(&self) -> Vec<ChunkDescriptor> {
        let column_count = self.column_count();
        self.chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| ChunkDescriptor {
                index,
                url: chunk.url.clone(),
                row_count: chunk.row_count,
                column_count,
            })
            .collect()
    }

    /// Auth material for the chunk downloads.
    pub fn download_auth(&self) -> DownloadAuth {
        DownloadAuth {
            qrmk: self.qrmk.clone(),
            chunk_headers: self.chunk_headers.clone().unwrap_or_default(),
        }
    }
}
