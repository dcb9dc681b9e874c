use std::time::Duration;

use chronoplay_core::{DEFAULT_FPS, EngineError, StoreError};

/// How long the scheduler waits per idle wake-up while paused.
pub const PAUSE_SLEEP: Duration = Duration::from_secs(1);

/// Rewinding runs at this fraction of the requested speed.
pub const REWIND_FACTOR: f64 = 0.25;

/// Rewind buffers never cover less than this many seconds.
pub const MIN_REWIND_TIME_SEC: u32 = 10;

// Hybrid wait tuning:
// - Block on the control channel until close to the deadline.
// - Spin for the final window for tighter step pacing.
pub(crate) const SPIN_THRESHOLD: Duration = Duration::from_micros(300);
pub(crate) const SPIN_YIELD_EVERY: u32 = 512;
/// Falling further behind than this many periods re-anchors the deadline.
pub(crate) const MAX_CATCH_UP_PERIODS: u32 = 3;
/// Upper bound for a single step period, reached only at vanishing speeds.
pub(crate) const MAX_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Idle wait while paused. Stop and speed changes still wake immediately.
    pub pause_sleep: Duration,
    /// Replaces a frame rate that is not strictly positive.
    pub default_fps: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pause_sleep: PAUSE_SLEEP,
            default_fps: DEFAULT_FPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Multiplier applied to negative speeds.
    pub rewind_factor: f64,
    /// Floor for the configured rewind window.
    pub min_rewind_time_sec: u32,
    /// Speed the scheduler runs at right after `initialize`.
    pub initial_speed: f64,
    /// Background savestate period; `None` disables auto-save.
    pub autosave_interval: Option<Duration>,
    pub scheduler: SchedulerConfig,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            rewind_factor: REWIND_FACTOR,
            min_rewind_time_sec: MIN_REWIND_TIME_SEC,
            initial_speed: 1.0,
            autosave_interval: None,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PlaybackConfig {
    /// Rewind factor, falling back to [`REWIND_FACTOR`] when unusable.
    pub(crate) fn effective_rewind_factor(&self) -> f64 {
        if self.rewind_factor.is_finite() && self.rewind_factor > 0.0 {
            self.rewind_factor
        } else {
            REWIND_FACTOR
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("engine does not support state serialization")]
    SerializationUnsupported,
    #[error("session has no game path and cannot be persisted")]
    NotPersistable,
    #[error("savestate holds {actual} bytes, engine expects {expected}")]
    IncompatibleSavestate { expected: usize, actual: usize },
    #[error("savestate format {found} is newer than supported format {supported}")]
    UnsupportedFormat { found: u32, supported: u32 },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
