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

//! ChunkPrefetcher for ordered, bounded chunk delivery.
//!
//! This is the main component that coordinates:
//! - A fixed arena of `S` reusable chunk buffers, slot = chunk index mod `S`
//! - At most `S` concurrent downloads running ahead of consumption
//! - Strictly ordered delivery, independent of download completion order
//! - Error propagation and cancellation
//!
//! ## Lending
//!
//! [`ChunkPrefetcher::next_chunk`] returns a reference that borrows the
//! prefetcher mutably, so a chunk can only be read until the next call.
//! That call checks the previous buffer back in, and only then may the
//! buffer be reset for chunk `i + S`.

use crate::client::Transport;
use crate::error::{Error, Result};
use crate::reader::chunked::chunk_buffer::ChunkBuffer;
use crate::reader::chunked::downloader::{ChunkDownloader, DownloadContext, DownloadOutcome};
use crate::types::chunk::{ChunkDescriptor, DownloadAuth, PrefetchConfig};
use crate::types::manifest::ResultChunkManifest;
use crate::types::request::ChunkDownloadRequest;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One position of the buffer arena.
enum Slot {
    /// A download owns the buffer.
    Pending {
        chunk_index: usize,
        handle: JoinHandle<DownloadOutcome>,
    },
    /// The buffer is back in the arena (decoded, consumed or failed).
    Ready(ChunkBuffer),
    /// Not allocated yet, or the buffer was lost with a crashed task.
    Vacant,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Pending { chunk_index, .. } => write!(f, "Pending({})", chunk_index),
            Slot::Ready(buffer) => {
                write!(f, "Ready({:?}, {:?})", buffer.chunk_index(), buffer.state())
            }
            Slot::Vacant => f.write_str("Vacant"),
        }
    }
}

/// Downloads the chunks of one result set ahead of consumption and hands
/// them out in index order.
pub struct ChunkPrefetcher {
    descriptors: Vec<ChunkDescriptor>,
    column_count: usize,
    auth: DownloadAuth,
    config: PrefetchConfig,
    downloader: Arc<ChunkDownloader>,

    slots: Vec<Slot>,
    next_to_download: usize,
    next_to_consume: usize,
    allocated_buffers: usize,

    cancel_token: CancellationToken,
    runtime_handle: tokio::runtime::Handle,
}

impl std::fmt::Debug for ChunkPrefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPrefetcher")
            .field("chunk_count", &self.descriptors.len())
            .field("slots", &self.slots)
            .field("next_to_download", &self.next_to_download)
            .field("next_to_consume", &self.next_to_consume)
            .field("allocated_buffers", &self.allocated_buffers)
            .finish()
    }
}

impl ChunkPrefetcher {
    /// Create a prefetcher and start downloading the first `S` chunks.
    ///
    /// # Arguments
    /// * `column_count` - Number of columns in every row of every chunk
    /// * `descriptors` - All chunks of the result set, ordered by index
    /// * `auth` - Storage auth shared by every chunk download
    /// * `transport` - Transport used for the downloads
    /// * `config` - Prefetch concurrency and download timeouts
    /// * `cancel_token` - Cancels the whole result set; a child token is used
    ///   internally so dropping the prefetcher never cancels the caller's token
    /// * `runtime_handle` - Runtime the downloads are spawned on
    pub fn new(
        column_count: usize,
        descriptors: Vec<ChunkDescriptor>,
        auth: DownloadAuth,
        transport: Arc<dyn Transport>,
        config: PrefetchConfig,
        cancel_token: &CancellationToken,
        runtime_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        config.validate()?;
        validate_descriptors(column_count, &descriptors)?;

        let slot_count = config.slot_count(descriptors.len());
        let downloader = Arc::new(ChunkDownloader::new(
            transport,
            runtime_handle.clone(),
            config.speed_threshold_mbps,
        ));

        info!(
            "Starting chunk prefetch: {} chunks, {} columns, {} slots",
            descriptors.len(),
            column_count,
            slot_count
        );

        let mut prefetcher = Self {
            descriptors,
            column_count,
            auth,
            config,
            downloader,
            slots: (0..slot_count).map(|_| Slot::Vacant).collect(),
            next_to_download: 0,
            next_to_consume: 0,
            allocated_buffers: 0,
            cancel_token: cancel_token.child_token(),
            runtime_handle,
        };

        while prefetcher.next_to_download < slot_count {
            prefetcher.dispatch_next()?;
        }

        Ok(prefetcher)
    }

    /// Create a prefetcher for the chunks listed in an execution response.
    pub fn from_manifest(
        manifest: &ResultChunkManifest,
        transport: Arc<dyn Transport>,
        config: PrefetchConfig,
        cancel_token: &CancellationToken,
        runtime_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        Self::new(
            manifest.column_count(),
            manifest.descriptors(),
            manifest.download_auth(),
            transport,
            config,
            cancel_token,
            runtime_handle,
        )
    }

    /// Get the next chunk in index order. Main consumer interface.
    ///
    /// Returns `Ok(None)` once every chunk has been handed out, on this and
    /// every later call. A failed chunk surfaces its error exactly once and
    /// the following call moves on to the next chunk. After cancellation
    /// every call that is not past the end returns [`Error::Cancelled`].
    ///
    /// Dropping the returned future before it resolves is safe: the chunk
    /// stays pending and the next call waits for it again.
    pub async fn next_chunk(&mut self) -> Result<Option<&ChunkBuffer>> {
        if self.next_to_consume >= self.descriptors.len() {
            return Ok(None);
        }
        if self.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.check_in_previous();
        if self.next_to_download < self.descriptors.len()
            && self.next_to_download < self.next_to_consume + self.slots.len()
        {
            self.dispatch_next()?;
        }

        let chunk_index = self.next_to_consume;
        let slot = chunk_index % self.slots.len();

        let joined = match &mut self.slots[slot] {
            Slot::Pending {
                chunk_index: pending,
                handle,
            } if *pending == chunk_index => {
                tokio::select! {
                    biased;
                    _ = self.cancel_token.cancelled() => {
                        debug!("Wait for chunk {} cancelled", chunk_index);
                        return Err(Error::Cancelled);
                    }
                    joined = handle => joined,
                }
            }
            other => {
                return Err(Error::Internal(format!(
                    "chunk {} expected in slot {}, found {:?}",
                    chunk_index, slot, other
                )))
            }
        };

        self.next_to_consume += 1;

        let result = match joined {
            Ok(DownloadOutcome { buffer, result, .. }) => {
                self.slots[slot] = buffer.map(Slot::Ready).unwrap_or(Slot::Vacant);
                result
            }
            Err(e) => {
                self.slots[slot] = Slot::Vacant;
                Err(Error::Internal(format!(
                    "Download task for chunk {} failed: {}",
                    chunk_index, e
                )))
            }
        };

        if let Err(e) = result {
            warn!("Chunk {} failed: {}", chunk_index, e);
            return Err(e);
        }

        match &self.slots[slot] {
            Slot::Ready(buffer) => {
                debug!(
                    "Delivering chunk {} from slot {} ({} rows)",
                    chunk_index,
                    slot,
                    buffer.row_count()
                );
                Ok(Some(buffer))
            }
            other => Err(Error::Internal(format!(
                "chunk {} decoded but slot {} is {:?}",
                chunk_index, slot, other
            ))),
        }
    }

    /// Cancel every outstanding download of this result set.
    pub fn cancel(&self) {
        debug!("Cancelling chunk prefetch");
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Total number of chunks in the result set.
    pub fn chunk_count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of prefetch slots, `min(prefetch_threads, chunk_count)`.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Buffers allocated so far. Equals the slot count unless a download
    /// task crashed and its buffer had to be replaced.
    pub fn allocated_buffers(&self) -> usize {
        self.allocated_buffers
    }

    pub fn next_to_download(&self) -> usize {
        self.next_to_download
    }

    pub fn next_to_consume(&self) -> usize {
        self.next_to_consume
    }

    /// Downloads dispatched but not yet finished.
    pub fn pending_downloads(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Pending { handle, .. } if !handle.is_finished()))
            .count()
    }

    /// Mark the chunk handed out by the previous call as consumed.
    fn check_in_previous(&mut self) {
        if self.next_to_consume == 0 {
            return;
        }
        let slot = (self.next_to_consume - 1) % self.slots.len();
        if let Slot::Ready(buffer) = &mut self.slots[slot] {
            buffer.mark_consumed();
        }
    }

    /// Take the buffer of `slot` out of the arena for a new download.
    fn check_out(&mut self, slot: usize) -> Result<ChunkBuffer> {
        match std::mem::replace(&mut self.slots[slot], Slot::Vacant) {
            Slot::Ready(buffer) => Ok(buffer),
            Slot::Vacant => {
                if self.allocated_buffers >= self.slots.len() {
                    warn!("Slot {} lost its buffer, allocating a replacement", slot);
                }
                self.allocated_buffers += 1;
                Ok(ChunkBuffer::new(slot, self.column_count))
            }
            pending @ Slot::Pending { .. } => {
                let message = format!("slot {} is still downloading: {:?}", slot, pending);
                self.slots[slot] = pending;
                Err(Error::Internal(message))
            }
        }
    }

    /// Reset the buffer at `next_to_download mod S` and start its download.
    fn dispatch_next(&mut self) -> Result<()> {
        let chunk_index = self.next_to_download;
        let slot = chunk_index % self.slots.len();
        let descriptor = self.descriptors[chunk_index].clone();

        let mut buffer = self.check_out(slot)?;
        if let Err(e) = buffer.reset(&descriptor) {
            self.slots[slot] = Slot::Ready(buffer);
            return Err(e);
        }

        let request = ChunkDownloadRequest::new(descriptor.url, &self.auth).with_timeouts(
            self.config.download_timeout,
            self.config.download_attempt_timeout,
        );
        let context = DownloadContext {
            chunk_index,
            buffer,
            request,
            cancel_token: self.cancel_token.clone(),
        };

        debug!("Dispatching chunk {} into slot {}", chunk_index, slot);

        let downloader = Arc::clone(&self.downloader);
        let handle = self
            .runtime_handle
            .spawn(async move { downloader.download(context).await });

        self.slots[slot] = Slot::Pending {
            chunk_index,
            handle,
        };
        self.next_to_download += 1;
        Ok(())
    }
}

impl Drop for ChunkPrefetcher {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

fn validate_descriptors(column_count: usize, descriptors: &[ChunkDescriptor]) -> Result<()> {
    for (position, descriptor) in descriptors.iter().enumerate() {
        if descriptor.index != position {
            return Err(Error::Config(format!(
                "chunk descriptors out of order: position {} has index {}",
                position, descriptor.index
            )));
        }
        if descriptor.column_count != column_count {
            return Err(Error::Config(format!(
                "chunk {} has {} columns, result set has {}",
                descriptor.index, descriptor.column_count, column_count
            )));
        }
    }
    Ok(())
}
