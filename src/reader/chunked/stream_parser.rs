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

//! Incremental decoder for chunk bodies.
//!
//! A chunk body is a comma-separated list of JSON row arrays with no
//! enclosing brackets:
//!
//! ```text
//! ["1","abc",null],["2","",null]
//! ```
//!
//! The reader is wrapped as `"[" + body + "]"` and fed to a streaming
//! `serde_json` deserializer whose seeds write every cell straight into a
//! [`ChunkBuffer`]. The body is never held in memory as a whole.

use crate::error::{Error, Result};
use crate::reader::chunked::chunk_buffer::{BufferState, ChunkBuffer};
use serde::de::{self, DeserializeSeed, SeqAccess, Visitor};
use std::fmt;
use std::io::{BufReader, Read};
use tracing::{debug, warn};

/// Decode a bracketless row-array body into `buffer`.
///
/// `buffer` must have been reset to the chunk being decoded. On success it
/// is left `Decoded`; on any failure it is left `Failed`.
pub fn parse_rows<R: Read>(reader: R, buffer: &mut ChunkBuffer) -> Result<()> {
    let chunk_index = match (buffer.state(), buffer.chunk_index()) {
        (BufferState::Downloading, Some(index)) => index,
        (state, _) => {
            return Err(Error::Internal(format!(
                "slot {} is {:?}, expected a buffer reset for download",
                buffer.slot(),
                state
            )))
        }
    };

    let input = (&b"["[..])
        .chain(BufReader::new(reader))
        .chain(&b"]"[..]);
    let mut deserializer = serde_json::Deserializer::from_reader(input);

    let decoded = RowsSeed {
        buffer: &mut *buffer,
    }
    .deserialize(&mut deserializer)
    .and_then(|()| deserializer.end());

    if let Err(e) = decoded {
        buffer.mark_failed();
        return Err(map_parse_error(chunk_index, e));
    }

    let expected = buffer.descriptor().map(|d| d.row_count).unwrap_or(0);
    if buffer.row_count() != expected {
        warn!(
            "Chunk {}: decoded {} rows, manifest announced {}",
            chunk_index,
            buffer.row_count(),
            expected
        );
    }
    debug!(
        "Chunk {}: decoded {} rows x {} columns into slot {}",
        chunk_index,
        buffer.row_count(),
        buffer.column_count(),
        buffer.slot()
    );

    buffer.mark_decoded();
    Ok(())
}

/// Body read failures are transport errors; everything else is a bad payload.
fn map_parse_error(chunk_index: usize, error: serde_json::Error) -> Error {
    if error.is_io() {
        let io_error = std::io::Error::from(error);
        return Error::Transport(format!(
            "reading chunk {} body failed: {}",
            chunk_index, io_error
        ));
    }
    Error::MalformedPayload {
        chunk_index,
        message: error.to_string(),
    }
}

/// The outer `[ row, row, ... ]` sequence.
struct RowsSeed<'a> {
    buffer: &'a mut ChunkBuffer,
}

impl<'de> DeserializeSeed<'de> for RowsSeed<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for RowsSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a sequence of row arrays")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let buffer = self.buffer;
        while seq
            .next_element_seed(RowSeed {
                buffer: &mut *buffer,
            })?
            .is_some()
        {}
        Ok(())
    }
}

/// One row array.
struct RowSeed<'a> {
    buffer: &'a mut ChunkBuffer,
}

impl<'de> DeserializeSeed<'de> for RowSeed<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for RowSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a row array")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let buffer = self.buffer;
        buffer.begin_row();
        while seq
            .next_element_seed(CellSeed {
                buffer: &mut *buffer,
            })?
            .is_some()
        {}
        buffer.end_row().map_err(de::Error::custom)
    }
}

/// One cell: a string or null.
struct CellSeed<'a> {
    buffer: &'a mut ChunkBuffer,
}

impl<'de> DeserializeSeed<'de> for CellSeed<'_> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

// Numbers, booleans, arrays and objects fall through to the default visitor
// methods, which reject them as an invalid type. Cells are copied verbatim,
// and a parsed number no longer carries its source text.
impl<'de> Visitor<'de> for CellSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or null cell")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<(), E> {
        self.buffer.push_cell(Some(v));
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<(), E> {
        self.buffer.push_cell(None);
        Ok(())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<(), E> {
        self.visit_unit()
    }
}
