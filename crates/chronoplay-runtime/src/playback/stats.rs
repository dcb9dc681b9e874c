use chronoplay_rewind::RewindBuffer;

/// Derived playback statistics, read as one consistent snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackStats {
    /// Time covered by past frames plus the current one.
    pub played_ms: f64,
    /// Time the rewind buffer can cover when full.
    pub total_ms: f64,
    /// Time covered by future (redo) frames.
    pub cached_ms: f64,
    /// Elapsed simulation frames, as stored in savestates.
    pub elapsed_frames: u64,
    /// Forward steps whose state capture failed and left no slot behind.
    pub capture_failures: u64,
}

impl PlaybackStats {
    /// Share of the buffer holding redo frames, `0..=100`.
    pub fn cache_percent(&self) -> f64 {
        if self.total_ms > 0.0 {
            (self.cached_ms / self.total_ms * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    }

    pub(crate) fn refresh_times(&mut self, buffer: Option<&RewindBuffer>, fps: f64) {
        let Some(buffer) = buffer else {
            self.played_ms = 0.0;
            self.total_ms = 0.0;
            self.cached_ms = 0.0;
            return;
        };

        let current = usize::from(!buffer.is_empty());
        self.played_ms = frames_to_ms(buffer.past_frames_available() + current, fps);
        self.total_ms = frames_to_ms(buffer.max_frame_count(), fps);
        self.cached_ms = frames_to_ms(buffer.future_frames_available(), fps);
    }
}

#[inline]
pub(crate) fn frames_to_ms(frames: usize, fps: f64) -> f64 {
    frames as f64 / fps * 1000.0
}
