//! Bounded history of serialized engine states with a movable cursor.
//!
//! # Design
//! - The *current* frame is always kept verbatim, so reading it is free.
//! - Every other held frame is reachable through a chain of patches. The patch
//!   at logical index `i` links held frame `i` with held frame `i + 1`; it is
//!   the LZ4-compressed XOR of the two (see [`delta`]).
//! - Patches live in a fixed arena of `max_frames - 1` slots addressed by a
//!   modular head index. Evicting the oldest frame only moves the head, and a
//!   slot's byte storage is reused when the ring wraps.
//!
//! ```text
//!   held frames:   f0 ── f1 ── f2 ── f3 ── f4
//!   patches:          p0    p1    p2    p3
//!   cursor:                      ^ current (verbatim)
//!   past = 2, future = 2
//! ```
//!
//! Rewinding one frame applies `p[cursor - 1]` to the current bytes; advancing
//! applies `p[cursor]`. Both cost one decompression plus one XOR pass.
//!
//! # Failure handling
//! A patch that fails to decode means the history is corrupted. The buffer is
//! flushed and the operation reports that it moved zero frames.

pub mod delta;

use thiserror::Error;
use tracing::{debug, warn};

use delta::DeltaCodec;

pub use delta::DeltaError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewindError {
    #[error("rewind frame size must be non-zero")]
    ZeroFrameSize,
}

/// One arena slot. Holds a compressed patch while it is live.
#[derive(Default, Clone)]
struct PatchSlot {
    bytes: Vec<u8>,
}

pub struct RewindBuffer {
    frame_size: usize,
    max_frames: usize,

    /// Verbatim bytes of the current frame. Only meaningful when `has_current`.
    current: Vec<u8>,
    has_current: bool,
    /// Filled by the caller between `begin_frame` and `submit_frame`.
    staging: Vec<u8>,

    /// Ring of `max_frames - 1` patch slots.
    patches: Vec<PatchSlot>,
    /// Physical index of logical patch 0.
    head: usize,
    /// Number of live patches (held frames minus one).
    len: usize,
    /// Logical index of the current frame among the held frames.
    cursor: usize,

    /// Logical elapsed-frame number of the current frame.
    frame_counter: u64,

    codec: DeltaCodec,
}

impl RewindBuffer {
    /// Creates an empty buffer for frames of exactly `frame_size` bytes,
    /// holding at most `max_frames` of them (at least one).
    pub fn new(frame_size: usize, max_frames: usize) -> Result<Self, RewindError> {
        if frame_size == 0 {
            return Err(RewindError::ZeroFrameSize);
        }

        let max_frames = max_frames.max(1);
        Ok(Self {
            frame_size,
            max_frames,
            current: vec![0; frame_size],
            has_current: false,
            staging: vec![0; frame_size],
            patches: vec![PatchSlot::default(); max_frames - 1],
            head: 0,
            len: 0,
            cursor: 0,
            frame_counter: 0,
            codec: DeltaCodec::new(frame_size),
        })
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub fn max_frame_count(&self) -> usize {
        self.max_frames
    }

    /// Frames held, including the current one.
    #[inline]
    pub fn held_frames(&self) -> usize {
        if self.has_current { self.len + 1 } else { 0 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_current
    }

    #[inline]
    pub fn past_frames_available(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn future_frames_available(&self) -> usize {
        self.len - self.cursor
    }

    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Rebinds the logical frame counter without touching held frames.
    pub fn set_frame_counter(&mut self, frame_count: u64) {
        self.frame_counter = frame_count;
    }

    /// Bytes currently used by frame storage, excluding fixed scratch space.
    pub fn memory_usage(&self) -> usize {
        let patches: usize = (0..self.len)
            .map(|i| self.patches[self.physical(i)].bytes.len())
            .sum();
        patches + if self.has_current { self.frame_size } else { 0 }
    }

    /// Returns the staging region for the next frame. Does not move the cursor.
    pub fn begin_frame(&mut self) -> &mut [u8] {
        &mut self.staging
    }

    /// Commits the staging region as the new current frame.
    ///
    /// Future frames are discarded. When the buffer is full the oldest frame
    /// is evicted.
    pub fn submit_frame(&mut self) {
        self.frame_counter = self.frame_counter.wrapping_add(1);

        if !self.has_current {
            std::mem::swap(&mut self.current, &mut self.staging);
            self.has_current = true;
            self.head = 0;
            self.len = 0;
            self.cursor = 0;
            return;
        }

        // A fresh step invalidates every redo state.
        self.len = self.cursor;

        let ring = self.patches.len();
        if ring == 0 {
            std::mem::swap(&mut self.current, &mut self.staging);
            return;
        }

        if self.len == ring {
            self.head = (self.head + 1) % ring;
            self.len -= 1;
            self.cursor -= 1;
        }

        let slot = self.physical(self.len);
        if let Err(e) = self
            .codec
            .encode(&self.current, &self.staging, &mut self.patches[slot].bytes)
        {
            // The chain cannot link the new frame; restart history from it.
            warn!(error = %e, "failed to encode rewind patch, restarting history");
            self.reset_cursor();
            std::mem::swap(&mut self.current, &mut self.staging);
            self.has_current = true;
            return;
        }

        std::mem::swap(&mut self.current, &mut self.staging);
        self.len += 1;
        self.cursor = self.len;
    }

    /// Bytes of the current frame, or `None` while the buffer is empty.
    pub fn current_frame(&self) -> Option<&[u8]> {
        self.has_current.then_some(self.current.as_slice())
    }

    /// Moves the cursor back by up to `frames` and returns how far it moved.
    pub fn rewind_frames(&mut self, frames: usize) -> usize {
        let count = frames.min(self.past_frames_available());
        for _ in 0..count {
            let slot = self.physical(self.cursor - 1);
            if let Err(e) = self
                .codec
                .apply(&self.patches[slot].bytes, &mut self.current)
            {
                warn!(error = %e, "corrupted rewind patch, flushing history");
                self.flush();
                return 0;
            }
            self.cursor -= 1;
        }

        self.frame_counter = self.frame_counter.wrapping_sub(count as u64);
        count
    }

    /// Moves the cursor forward by up to `frames` and returns how far it moved.
    pub fn advance_frames(&mut self, frames: usize) -> usize {
        let count = frames.min(self.future_frames_available());
        for _ in 0..count {
            let slot = self.physical(self.cursor);
            if let Err(e) = self
                .codec
                .apply(&self.patches[slot].bytes, &mut self.current)
            {
                warn!(error = %e, "corrupted rewind patch, flushing history");
                self.flush();
                return 0;
            }
            self.cursor += 1;
        }

        self.frame_counter = self.frame_counter.wrapping_add(count as u64);
        count
    }

    /// Changes the capacity in place.
    ///
    /// Shrinking keeps the most recent frames: the oldest past frames go first,
    /// then the newest future frames. The current frame is never dropped.
    pub fn set_max_frame_count(&mut self, max_frames: usize) {
        let max_frames = max_frames.max(1);
        if max_frames == self.max_frames {
            return;
        }

        let held = self.held_frames();
        let mut drop_past = 0;
        let mut drop_future = 0;
        if held > max_frames {
            let excess = held - max_frames;
            drop_past = excess.min(self.cursor);
            drop_future = excess - drop_past;
        }

        let keep = self.len.saturating_sub(drop_past + drop_future);
        let mut patches = vec![PatchSlot::default(); max_frames - 1];
        for (i, dst) in patches.iter_mut().take(keep).enumerate() {
            let src = self.physical(drop_past + i);
            *dst = std::mem::take(&mut self.patches[src]);
        }

        debug!(
            from = self.max_frames,
            to = max_frames,
            dropped = drop_past + drop_future,
            "resized rewind buffer"
        );

        self.patches = patches;
        self.max_frames = max_frames;
        self.head = 0;
        self.len = keep;
        self.cursor -= drop_past;
    }

    /// Drops every held frame. Capacity and the frame counter are kept.
    pub fn flush(&mut self) {
        self.reset_cursor();
        self.has_current = false;
    }

    fn reset_cursor(&mut self) {
        self.head = 0;
        self.len = 0;
        self.cursor = 0;
    }

    #[inline]
    fn physical(&self, logical: usize) -> usize {
        (self.head + logical) % self.patches.len()
    }
}

impl std::fmt::Debug for RewindBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewindBuffer")
            .field("frame_size", &self.frame_size)
            .field("max_frames", &self.max_frames)
            .field("past", &self.past_frames_available())
            .field("future", &self.future_frames_available())
            .field("frame_counter", &self.frame_counter)
            .finish_non_exhaustive()
    }
}
