//! Reversible playback runtime.
//!
//! [`StepScheduler`] drives fixed-rate forward or backward steps on a
//! background thread. [`ReversiblePlayback`] plugs an
//! [`Engine`](chronoplay_core::Engine) into it, recording every forward step
//! into a [`RewindBuffer`](chronoplay_rewind::RewindBuffer) so playback can run
//! backwards, seek, and persist savestates through a
//! [`SavestateStore`](chronoplay_core::SavestateStore).

pub mod autosave;
pub mod playback;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod types;

pub use autosave::{AutoSave, AutoSaveTarget};
pub use playback::{PlaybackStats, ReversiblePlayback};
pub use scheduler::{FrameStepper, SchedulerHandle, SchedulerStats, StepScheduler, stepper_fn};
pub use settings::{PlaybackSettings, Settings};
pub use store::{FileSavestateStore, MemorySavestateStore};
pub use types::{
    MIN_REWIND_TIME_SEC, PAUSE_SLEEP, PlaybackConfig, PlaybackError, REWIND_FACTOR,
    SchedulerConfig, SchedulerError,
};
