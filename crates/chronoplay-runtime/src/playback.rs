//! Reversible playback: a rewind buffer driven by the step scheduler.

mod session;
mod stats;

use std::sync::Arc;

use chronoplay_core::{Engine, SaveType, SavestateStore, sanitize_fps};
use tracing::{info, warn};

pub use stats::PlaybackStats;

use self::session::{Session, SessionAutoSave, SessionStepper};
use crate::{
    autosave::AutoSave,
    scheduler::{SchedulerStats, StepScheduler},
    settings::{Settings, SettingsWatcher},
    types::{PlaybackConfig, PlaybackError},
};

/// Plays an [`Engine`] forwards and backwards in time.
///
/// Forward steps record the engine state into a rewind buffer, backward steps
/// restore it. Savestates go through the [`SavestateStore`] and the rewind
/// window follows the shared [`Settings`].
///
/// Nothing runs until [`initialize`](Self::initialize). Dropping the
/// controller stops every background thread.
pub struct ReversiblePlayback<E, S>
where
    E: Engine + 'static,
    S: SavestateStore + 'static,
{
    session: Arc<Session<E, S>>,
    settings: Settings,
    config: PlaybackConfig,
    rewind_factor: f64,
    scheduler: Option<StepScheduler>,
    watcher: Option<SettingsWatcher>,
    autosave: Option<AutoSave>,
}

impl<E, S> ReversiblePlayback<E, S>
where
    E: Engine + 'static,
    S: SavestateStore + 'static,
{
    pub fn new(engine: E, store: Arc<S>, settings: Settings, config: PlaybackConfig) -> Self {
        let fps = sanitize_fps(engine.frame_rate());
        let rewind_factor = config.effective_rewind_factor();
        let session = Session::new(engine, store, fps, config.min_rewind_time_sec);
        Self {
            session: Arc::new(session),
            settings,
            config,
            rewind_factor,
            scheduler: None,
            watcher: None,
            autosave: None,
        }
    }

    /// Builds the rewind buffer and starts the scheduler at the configured
    /// initial speed. Calling it again while running does nothing.
    pub fn initialize(&mut self) -> Result<(), PlaybackError> {
        if self.scheduler.is_some() {
            return Ok(());
        }

        // Subscribe first so a change racing with the initial apply is not lost.
        let changes = self.settings.subscribe();
        self.session.apply_settings(self.settings.get());

        let session = Arc::clone(&self.session);
        let watcher = SettingsWatcher::spawn(changes, move |values| session.apply_settings(values))
            .map_err(|source| PlaybackError::Spawn {
                name: "settings",
                source,
            })?;

        let scheduler = StepScheduler::start_with_config(
            self.session.fps,
            self.scale_speed(self.config.initial_speed),
            SessionStepper(Arc::clone(&self.session)),
            self.config.scheduler,
        )?;

        let autosave = match self.config.autosave_interval {
            Some(interval) if !interval.is_zero() => {
                let target = Arc::new(SessionAutoSave {
                    session: Arc::clone(&self.session),
                    scheduler: scheduler.handle(),
                });
                let autosave = AutoSave::start(interval, target).map_err(|source| {
                    PlaybackError::Spawn {
                        name: "autosave",
                        source,
                    }
                })?;
                Some(autosave)
            }
            _ => None,
        };

        self.watcher = Some(watcher);
        self.scheduler = Some(scheduler);
        self.autosave = autosave;
        info!(
            fps = self.session.fps,
            rewind_factor = self.rewind_factor,
            "playback initialized"
        );
        Ok(())
    }

    /// Stops every background thread and drops the rewind history.
    pub fn deinitialize(&mut self) {
        let running = self.scheduler.is_some();
        if let Some(mut autosave) = self.autosave.take() {
            autosave.stop();
        }
        self.watcher = None;
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        self.session.close();
        if running {
            info!("playback deinitialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn can_pause(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Seeking needs rewind history.
    pub fn can_seek(&self) -> bool {
        self.session.has_buffer()
    }

    pub fn frame_rate(&self) -> f64 {
        self.session.fps
    }

    pub fn time_ms(&self) -> u64 {
        self.stats().played_ms.round() as u64
    }

    pub fn total_time_ms(&self) -> u64 {
        self.stats().total_ms.round() as u64
    }

    pub fn cache_time_ms(&self) -> u64 {
        self.stats().cached_ms.round() as u64
    }

    /// Jumps within the rewind window. Targets outside of it are clamped;
    /// a target within half a frame of the present is a no-op.
    pub fn seek_time_ms(&self, target_ms: u64) {
        let handle = self.scheduler.as_ref().map(StepScheduler::handle);
        self.session.seek(target_ms, handle.as_ref());
    }

    /// The last requested speed, before the rewind derating.
    pub fn speed(&self) -> f64 {
        let Some(scheduler) = self.scheduler.as_ref() else {
            return 0.0;
        };
        let speed = scheduler.speed();
        if speed < 0.0 {
            speed / self.rewind_factor
        } else {
            speed
        }
    }

    /// Sets the playback speed. Negative speeds rewind, slowed down by the
    /// configured rewind factor. Before `initialize` this only replaces the
    /// initial speed.
    pub fn set_speed(&mut self, speed: f64) {
        let scaled = self.scale_speed(speed);
        match self.scheduler.as_ref() {
            Some(scheduler) => scheduler.set_speed(scaled),
            None => self.config.initial_speed = speed,
        }
    }

    pub fn pause_async(&self) {
        if let Some(scheduler) = self.scheduler.as_ref() {
            scheduler.pause_async();
        }
    }

    /// Runs one forward step on the caller's thread, as the scheduler would.
    /// Meant for frame advance while paused.
    pub fn step_frame(&self) {
        self.session.step_forward();
    }

    /// Runs one backward step on the caller's thread. No-op at the start of
    /// the rewind history.
    pub fn step_back_frame(&self) {
        self.session.step_backward();
    }

    /// Creates a manual savestate. Returns its id, or `None` on any failure.
    pub fn create_savestate(&self) -> Option<String> {
        match self.try_create_savestate("") {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to create savestate");
                None
            }
        }
    }

    pub fn try_create_savestate(&self, label: &str) -> Result<String, PlaybackError> {
        self.session.create_savestate(SaveType::Manual, label)
    }

    /// Loads savestate `id` into the engine. Returns `false` on any failure,
    /// in which case the engine and the rewind history are unchanged.
    pub fn load_savestate(&self, id: &str) -> bool {
        match self.try_load_savestate(id) {
            Ok(()) => true,
            Err(e) => {
                warn!(%id, error = %e, "failed to load savestate");
                false
            }
        }
    }

    pub fn try_load_savestate(&self, id: &str) -> Result<(), PlaybackError> {
        self.session.load_savestate(id)
    }

    pub fn stats(&self) -> PlaybackStats {
        self.session.stats()
    }

    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(|s| s.handle().stats())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Reapplies the current settings synchronously.
    pub fn apply_settings(&self) {
        self.session.apply_settings(self.settings.get());
    }

    /// Runs `f` with shared access to the engine. Blocks stepping while it
    /// runs.
    pub fn with_engine<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.session.inner.lock().engine)
    }

    /// Runs `f` with exclusive access to the engine. The next savestate is
    /// serialized from the engine rather than copied from the rewind buffer.
    pub fn with_engine_mut<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        self.session.with_engine_mut(f)
    }

    fn scale_speed(&self, speed: f64) -> f64 {
        if speed < 0.0 {
            speed * self.rewind_factor
        } else {
            speed
        }
    }
}

impl<E, S> Drop for ReversiblePlayback<E, S>
where
    E: Engine + 'static,
    S: SavestateStore + 'static,
{
    fn drop(&mut self) {
        self.deinitialize();
    }
}
