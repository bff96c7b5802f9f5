//! Frame buffers handed to the encoder.
//!
//! The transport owns the memory behind every `FrameBufferHandle`.  A session (either a live
//! broadcast or an ingest test) allocates a small fixed set up front and recycles them until the
//! session ends, at which point every buffer is handed back to the transport.

use thiserror::Error;
use tracing::debug;

use crate::api::{BroadcastApi, FrameBufferHandle};

/// Number of buffers a session allocates unless configured otherwise
pub const DEFAULT_FRAME_BUFFER_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameBufferError {
    /// The transport could not provide memory for one of the requested buffers
    #[error("Failed to allocate frame buffer {index} of {count} ({size} bytes each)")]
    AllocationFailed {
        index: usize,
        count: usize,
        size: usize,
    },
}

/// A fixed set of transport allocated frame buffers.
///
/// Buffers can be used two ways:
/// * `acquire()`/`release()` treat the pool as a free list, used when frames are captured by the
///   host and only come back once the encoder unlocks them.
/// * `next_round_robin()` cycles through every buffer regardless of ownership, used when the
///   contents are synthetic and the same buffer may be submitted repeatedly.
#[derive(Debug)]
pub struct FrameBufferPool {
    buffers: Vec<FrameBufferHandle>,
    free: Vec<FrameBufferHandle>,
    buffer_size: usize,
    cursor: usize,
}

impl FrameBufferPool {
    /// Allocates `count` buffers of `buffer_size` bytes.  If any allocation fails, the buffers
    /// that were already allocated are freed before the error is returned.
    pub fn allocate(
        api: &mut dyn BroadcastApi,
        count: usize,
        buffer_size: usize,
        randomize: bool,
    ) -> Result<FrameBufferPool, FrameBufferError> {
        let mut buffers = Vec::with_capacity(count);
        for index in 0..count {
            let buffer = match api.allocate_frame_buffer(buffer_size) {
                Some(buffer) => buffer,
                None => {
                    for buffer in buffers {
                        api.free_frame_buffer(buffer);
                    }

                    return Err(FrameBufferError::AllocationFailed {
                        index,
                        count,
                        size: buffer_size,
                    });
                }
            };

            if randomize {
                api.randomize_frame_buffer(buffer);
            }

            buffers.push(buffer);
        }

        debug!(count, buffer_size, "Allocated frame buffers");

        Ok(FrameBufferPool {
            free: buffers.clone(),
            buffers,
            buffer_size,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn contains(&self, buffer: FrameBufferHandle) -> bool {
        self.buffers.contains(&buffer)
    }

    /// Takes a buffer off the free list
    pub fn acquire(&mut self) -> Option<FrameBufferHandle> {
        self.free.pop()
    }

    /// Returns a buffer to the free list.  Buffers that do not belong to this pool, or that are
    /// already free, are ignored and `false` is returned.
    pub fn release(&mut self, buffer: FrameBufferHandle) -> bool {
        if !self.contains(buffer) || self.free.contains(&buffer) {
            return false;
        }

        self.free.push(buffer);
        true
    }

    /// Returns the next buffer in allocation order, wrapping around at the end
    pub fn next_round_robin(&mut self) -> Option<FrameBufferHandle> {
        let buffer = *self.buffers.get(self.cursor)?;
        self.cursor = (self.cursor + 1) % self.buffers.len();
        Some(buffer)
    }

    /// Restarts the round robin cycle at the first buffer
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Gives every buffer back to the transport
    pub fn free_all(self, api: &mut dyn BroadcastApi) {
        debug!(count = self.buffers.len(), "Freeing frame buffers");
        for buffer in self.buffers {
            api.free_frame_buffer(buffer);
        }
    }
}
