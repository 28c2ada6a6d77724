// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pooled typed buffers for field materialization (spec.md §4.12).

use std::collections::HashMap;

use crate::error::ExecError;
use crate::schedule::BufferFormat;

/// Default ceiling on bytes outstanding across all formats at once. Keeps a
/// runaway patch (an absurd element count, or a materialize leak) from
/// growing the pool without bound instead of failing the frame.
const DEFAULT_CAPACITY_BYTES: usize = 256 * 1024 * 1024;

/// A `(format, count)`-keyed free list of byte buffers (spec.md §4.12).
/// `acquire` pops a matching buffer or allocates one; `release` pushes it
/// back. Frame-local: not shared across concurrent frames (spec.md §5).
pub struct BufferPool {
    free: HashMap<(BufferFormat, u32), Vec<Vec<u8>>>,
    capacity_bytes: usize,
    outstanding_bytes: usize,
}

impl BufferPool {
    /// A pool bounded by `capacity_bytes` total bytes outstanding at once.
    #[must_use]
    pub fn new(capacity_bytes: usize) -> Self {
        Self { free: HashMap::new(), capacity_bytes, outstanding_bytes: 0 }
    }

    /// A pool at the default capacity.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }

    /// Acquires a zero-filled buffer sized for `count` elements of `format`,
    /// reusing a released one if the free list has a match.
    ///
    /// # Errors
    /// Returns [`ExecError::PoolExhausted`] if satisfying this request (with
    /// no matching free buffer available) would exceed the pool's capacity.
    pub fn acquire(&mut self, format: BufferFormat, count: u32) -> Result<Vec<u8>, ExecError> {
        let key = (format, count);
        if let Some(buf) = self.free.get_mut(&key).and_then(Vec::pop) {
            self.outstanding_bytes += buf.len();
            return Ok(buf);
        }
        let bytes = count as usize * format.element_bytes();
        if self.outstanding_bytes + bytes > self.capacity_bytes {
            return Err(ExecError::PoolExhausted { count, format: format!("{format:?}") });
        }
        self.outstanding_bytes += bytes;
        Ok(vec![0u8; bytes])
    }

    /// Returns a previously acquired buffer to the free list. `format` must
    /// match the one it was acquired with.
    pub fn release(&mut self, format: BufferFormat, buf: Vec<u8>) {
        self.outstanding_bytes = self.outstanding_bytes.saturating_sub(buf.len());
        let element_bytes = format.element_bytes().max(1);
        let count = (buf.len() / element_bytes) as u32;
        self.free.entry((format, count)).or_default().push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Tracks every buffer acquired during one frame, keyed by the `buffer_tag`
/// a `FieldMaterialize` step stamped it with, so a later `RenderAssemble`
/// step can look buffers up by name. Consumed and released back to the pool
/// at end of frame — the scoped acquisition pattern of spec.md §4.12.
#[derive(Default)]
pub struct FrameBuffers {
    entries: HashMap<String, (BufferFormat, Vec<u8>)>,
}

impl FrameBuffers {
    /// An empty frame-local registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly materialized buffer under its tag.
    pub fn insert(&mut self, tag: String, format: BufferFormat, bytes: Vec<u8>) {
        self.entries.insert(tag, (format, bytes));
    }

    /// Looks up a previously materialized buffer's bytes by tag.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&[u8]> {
        self.entries.get(tag).map(|(_, bytes)| bytes.as_slice())
    }

    /// Releases every tracked buffer back to `pool`, clearing this frame's
    /// registry. Always called once per frame regardless of how the frame
    /// concludes (spec.md §4.12's "released on all exit paths").
    pub fn release_all(&mut self, pool: &mut BufferPool) {
        for (_, (format, bytes)) in self.entries.drain() {
            pool.release(format, bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_reuses_released_buffer() {
        let mut pool = BufferPool::with_default_capacity();
        let buf = pool.acquire(BufferFormat::F32, 4).unwrap();
        assert_eq!(buf.len(), 16);
        pool.release(BufferFormat::F32, buf);
        assert_eq!(pool.free.len(), 1);
        let reused = pool.acquire(BufferFormat::F32, 4).unwrap();
        assert_eq!(reused.len(), 16);
        assert_eq!(pool.free.get(&(BufferFormat::F32, 4)).map(Vec::len), Some(0));
    }

    #[test]
    fn acquire_past_capacity_is_pool_exhausted() {
        let mut pool = BufferPool::new(8);
        let err = pool.acquire(BufferFormat::F32, 4).unwrap_err();
        assert_eq!(err, ExecError::PoolExhausted { count: 4, format: "F32".to_string() });
    }

    #[test]
    fn frame_buffers_round_trip_by_tag() {
        let mut pool = BufferPool::with_default_capacity();
        let mut frame = FrameBuffers::new();
        let buf = pool.acquire(BufferFormat::Rgba8, 2).unwrap();
        frame.insert("color".to_string(), BufferFormat::Rgba8, buf);
        assert_eq!(frame.get("color").unwrap().len(), 8);
        frame.release_all(&mut pool);
        assert!(frame.get("color").is_none());
    }
}
