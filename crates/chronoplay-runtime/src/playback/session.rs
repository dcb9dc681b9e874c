use std::{path::Path, sync::Arc, time::SystemTime};

use chronoplay_core::{Engine, SAVESTATE_FORMAT_VERSION, SaveType, SavestateStore};
use chronoplay_rewind::RewindBuffer;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::stats::PlaybackStats;
use crate::{
    autosave::AutoSaveTarget,
    scheduler::{FrameStepper, SchedulerHandle},
    settings::PlaybackSettings,
    types::PlaybackError,
};

pub(crate) struct SessionInner<E> {
    pub(crate) engine: E,
    pub(crate) buffer: Option<RewindBuffer>,
    pub(crate) stats: PlaybackStats,
    /// The buffer's current frame is byte-identical to the engine state.
    buffer_live: bool,
    /// Elapsed frames at the last auto save.
    last_autosave_frames: Option<u64>,
}

impl<E: Engine> SessionInner<E> {
    /// The buffer's frame counter is the elapsed-frame count while a buffer
    /// exists; the stats copy survives the buffer being destroyed.
    fn refresh_stats(&mut self, fps: f64) {
        if let Some(buffer) = self.buffer.as_ref() {
            self.stats.elapsed_frames = buffer.frame_counter();
        }
        self.stats.refresh_times(self.buffer.as_ref(), fps);
    }
}

/// State shared by the controller, the scheduler thread, the settings
/// watcher and the auto-saver.
///
/// Every buffer mutation and every multi-field read happens under `inner`.
/// Store I/O happens outside of it.
pub(crate) struct Session<E, S> {
    pub(crate) inner: Mutex<SessionInner<E>>,
    store: Arc<S>,
    pub(crate) fps: f64,
    min_rewind_time_sec: u32,
}

impl<E: Engine, S: SavestateStore> Session<E, S> {
    pub(crate) fn new(engine: E, store: Arc<S>, fps: f64, min_rewind_time_sec: u32) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                engine,
                buffer: None,
                stats: PlaybackStats::default(),
                buffer_live: false,
                last_autosave_frames: None,
            }),
            store,
            fps,
            min_rewind_time_sec,
        }
    }

    pub(crate) fn step_forward(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        inner.engine.run_step();
        // The engine really ran this frame, captured or not.
        inner.stats.elapsed_frames += 1;

        if let Some(buffer) = inner.buffer.as_mut() {
            match inner.engine.serialize(buffer.begin_frame()) {
                Ok(()) => {
                    buffer.submit_frame();
                    inner.buffer_live = true;
                }
                Err(e) => {
                    // No slot, but the frame still counts as elapsed.
                    buffer.set_frame_counter(inner.stats.elapsed_frames);
                    inner.buffer_live = false;
                    inner.stats.capture_failures += 1;
                    warn!(error = %e, frame = inner.stats.elapsed_frames, "failed to capture rewind frame");
                }
            }
        }

        inner.refresh_stats(self.fps);
    }

    pub(crate) fn step_backward(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let Some(buffer) = inner.buffer.as_mut() else {
            return;
        };
        let moved = buffer.rewind_frames(1);
        if moved == 0 {
            return;
        }

        if let Some(frame) = buffer.current_frame()
            && let Err(e) = inner.engine.deserialize(frame)
        {
            warn!(error = %e, "failed to restore rewind frame");
        }
        // Regenerate the output of the restored frame without recording it.
        inner.engine.run_step();
        inner.buffer_live = false;

        inner.refresh_stats(self.fps);
    }

    /// Moves the buffer cursor towards `target_ms`, pausing the scheduler
    /// while the engine is rewritten.
    pub(crate) fn seek(&self, target_ms: u64, scheduler: Option<&SchedulerHandle>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let Some(buffer) = inner.buffer.as_mut() else {
            return;
        };

        let delta_ms = target_ms as f64 - inner.stats.played_ms;
        let delta_frames = (delta_ms / 1000.0 * self.fps).round();
        let frames = if delta_frames > 0.0 {
            (delta_frames as usize).min(buffer.future_frames_available())
        } else {
            ((-delta_frames) as usize).min(buffer.past_frames_available())
        };
        if frames == 0 {
            return;
        }

        let prior_speed = scheduler.map(|s| {
            let speed = s.speed();
            s.pause_async();
            speed
        });

        if delta_frames > 0.0 {
            buffer.advance_frames(frames);
        } else {
            buffer.rewind_frames(frames);
        }
        debug!(target_ms, frames, forward = delta_frames > 0.0, "seek");

        if let Some(frame) = buffer.current_frame()
            && let Err(e) = inner.engine.deserialize(frame)
        {
            warn!(error = %e, "failed to restore frame after seek");
            inner.buffer_live = false;
        } else {
            inner.buffer_live = true;
        }
        inner.refresh_stats(self.fps);
        drop(guard);

        if let (Some(scheduler), Some(speed)) = (scheduler, prior_speed) {
            scheduler.set_speed(speed);
        }
    }

    /// Creates, resizes or destroys the rewind buffer to match `settings`.
    pub(crate) fn apply_settings(&self, settings: PlaybackSettings) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let frame_size = inner.engine.serialize_size();
        if !settings.rewind_enabled || frame_size == 0 {
            if inner.buffer.take().is_some() {
                info!("rewind buffer destroyed");
            }
            inner.refresh_stats(self.fps);
            return;
        }

        let seconds = settings.max_rewind_time_sec.max(self.min_rewind_time_sec);
        let max_frames = (f64::from(seconds) * self.fps).round().max(1.0) as usize;

        match inner.buffer.as_mut() {
            Some(buffer) if buffer.frame_size() == frame_size => {
                if buffer.max_frame_count() != max_frames {
                    info!(
                        from = buffer.max_frame_count(),
                        to = max_frames,
                        "rewind buffer resized"
                    );
                    buffer.set_max_frame_count(max_frames);
                }
            }
            _ => match RewindBuffer::new(frame_size, max_frames) {
                Ok(mut buffer) => {
                    buffer.set_frame_counter(inner.stats.elapsed_frames);
                    inner.buffer_live = false;
                    info!(frame_size, max_frames, seconds, "rewind buffer created");
                    inner.buffer = Some(buffer);
                }
                Err(e) => {
                    warn!(error = %e, "failed to create rewind buffer");
                    inner.buffer = None;
                }
            },
        }

        inner.refresh_stats(self.fps);
    }

    /// Drops the rewind buffer and all derived statistics.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        inner.buffer = None;
        inner.buffer_live = false;
        inner.stats = PlaybackStats::default();
        inner.last_autosave_frames = None;
    }

    /// Runs `f` with mutable engine access. The buffer can no longer vouch
    /// for the engine state afterwards.
    pub(crate) fn with_engine_mut<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        let mut inner = self.inner.lock();
        inner.buffer_live = false;
        f(&mut inner.engine)
    }

    pub(crate) fn stats(&self) -> PlaybackStats {
        self.inner.lock().stats
    }

    pub(crate) fn has_buffer(&self) -> bool {
        self.inner.lock().buffer.is_some()
    }

    pub(crate) fn create_savestate(
        &self,
        save_type: SaveType,
        label: &str,
    ) -> Result<String, PlaybackError> {
        let (game_path, record) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            let size = inner.engine.serialize_size();
            if size == 0 {
                return Err(PlaybackError::SerializationUnsupported);
            }
            let game_path = inner
                .engine
                .game_path()
                .map(Path::to_path_buf)
                .ok_or(PlaybackError::NotPersistable)?;

            let mut record = self.store.create_record();
            record.save_type = save_type;
            record.label = label.to_string();
            record.created_utc = SystemTime::now();
            record.game_file_name = game_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let elapsed = inner
                .buffer
                .as_ref()
                .map_or(inner.stats.elapsed_frames, RewindBuffer::frame_counter);
            record.set_timestamp(elapsed, self.fps);
            record.caption = savestate_caption(&game_path, record.timestamp_wall_clock);
            record.engine_id = inner.engine.engine_id().to_string();
            record.engine_version = inner.engine.engine_version().to_string();
            record.video = inner.engine.video_frame_info();

            let live_frame = inner
                .buffer
                .as_ref()
                .filter(|_| inner.buffer_live)
                .and_then(RewindBuffer::current_frame);
            match live_frame {
                Some(frame) if frame.len() == size => record.memory = frame.to_vec(),
                _ => {
                    let mut memory = vec![0; size];
                    inner.engine.serialize(&mut memory)?;
                    record.memory = memory;
                }
            }

            if save_type == SaveType::Auto {
                inner.last_autosave_frames = Some(inner.stats.elapsed_frames);
            }
            (game_path, record)
        };

        let frames = record.timestamp_frames;
        let id = self.store.add_record(&game_path, record)?;
        info!(%id, frames, ?save_type, "savestate created");
        Ok(id)
    }

    pub(crate) fn load_savestate(&self, id: &str) -> Result<(), PlaybackError> {
        if self.inner.lock().engine.serialize_size() == 0 {
            return Err(PlaybackError::SerializationUnsupported);
        }

        let record = self.store.get_record(id)?;
        if record.format_version > SAVESTATE_FORMAT_VERSION {
            return Err(PlaybackError::UnsupportedFormat {
                found: record.format_version,
                supported: SAVESTATE_FORMAT_VERSION,
            });
        }

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expected = inner.engine.serialize_size();
        if record.memory_size() != expected {
            return Err(PlaybackError::IncompatibleSavestate {
                expected,
                actual: record.memory_size(),
            });
        }

        inner.engine.deserialize(&record.memory)?;

        if let Some(buffer) = inner.buffer.as_mut() {
            if buffer.frame_size() == record.memory.len() {
                buffer.begin_frame().copy_from_slice(&record.memory);
                buffer.submit_frame();
                inner.buffer_live = true;
            }
            buffer.set_frame_counter(record.timestamp_frames);
        }
        inner.stats.elapsed_frames = record.timestamp_frames;
        inner.refresh_stats(self.fps);

        info!(%id, frames = record.timestamp_frames, "savestate loaded");
        Ok(())
    }
}

/// `"<game stem> 01:02:03"`, from the elapsed play time.
fn savestate_caption(game_path: &Path, seconds: f64) -> String {
    let stem = game_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let total = seconds.max(0.0) as u64;
    format!(
        "{stem} {:02}:{:02}:{:02}",
        total / 3600,
        total / 60 % 60,
        total % 60
    )
}

/// Drives a [`Session`] from the scheduler thread.
pub(crate) struct SessionStepper<E, S>(pub(crate) Arc<Session<E, S>>);

impl<E, S> FrameStepper for SessionStepper<E, S>
where
    E: Engine + 'static,
    S: SavestateStore + 'static,
{
    fn step_forward(&mut self) {
        self.0.step_forward();
    }

    fn step_backward(&mut self) {
        self.0.step_backward();
    }
}

/// Auto-saves a [`Session`] while it is playing forward and has advanced.
pub(crate) struct SessionAutoSave<E, S> {
    pub(crate) session: Arc<Session<E, S>>,
    pub(crate) scheduler: SchedulerHandle,
}

impl<E, S> AutoSaveTarget for SessionAutoSave<E, S>
where
    E: Engine + 'static,
    S: SavestateStore + 'static,
{
    fn autosave_enabled(&self) -> bool {
        if self.scheduler.speed() <= 0.0 {
            return false;
        }
        let inner = self.session.inner.lock();
        inner.last_autosave_frames != Some(inner.stats.elapsed_frames)
    }

    fn create_autosave(&self) -> Option<String> {
        match self.session.create_savestate(SaveType::Auto, "") {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "auto savestate failed");
                None
            }
        }
    }
}
