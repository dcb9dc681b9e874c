use std::{
    sync::{Arc, atomic::Ordering},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Sender, unbounded};
use tracing::{info, warn};

use super::{FrameStepper, control::ControlMessage, runner::Runner, state::SchedulerState};
use crate::types::{SchedulerConfig, SchedulerError};

struct SchedulerInner {
    ctrl_tx: Sender<ControlMessage>,
    state: Arc<SchedulerState>,
}

/// Owns the timing thread. Dropping it stops the thread.
pub struct StepScheduler {
    handle: SchedulerHandle,
    join: Option<JoinHandle<()>>,
}

/// Cheap, cloneable access to a running scheduler from any thread.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<SchedulerInner>,
}

/// Counters maintained by the scheduler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub forward_steps: u64,
    pub backward_steps: u64,
    /// Pause-wait timeouts. Grows by one per `pause_sleep` while paused.
    pub idle_wakeups: u64,
}

impl StepScheduler {
    /// Starts a paused scheduler stepping at `fps` once a speed is set.
    pub fn start<S: FrameStepper>(fps: f64, stepper: S) -> Result<Self, SchedulerError> {
        Self::start_with_config(fps, 0.0, stepper, SchedulerConfig::default())
    }

    pub fn start_with_config<S: FrameStepper>(
        fps: f64,
        speed: f64,
        stepper: S,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            warn!(fps, default = config.default_fps, "invalid frame rate, using default");
            config.default_fps
        };

        let (ctrl_tx, ctrl_rx) = unbounded::<ControlMessage>();
        let state = Arc::new(SchedulerState::new(fps, sanitize_speed(speed)));
        let thread_state = Arc::clone(&state);
        let pause_sleep = config.pause_sleep;

        let join = thread::Builder::new()
            .name("chronoplay-scheduler".to_string())
            .spawn(move || {
                let mut runner = Runner::new(stepper, ctrl_rx, thread_state, pause_sleep);
                runner.run();
            })
            .map_err(SchedulerError::Spawn)?;

        info!(fps, "scheduler started");
        Ok(Self {
            handle: SchedulerHandle {
                inner: Arc::new(SchedulerInner { ctrl_tx, state }),
            },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }

    /// Stops the timing thread and waits for it to exit.
    ///
    /// A sleep in progress is interrupted; a step in progress finishes first.
    pub fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.handle.inner.ctrl_tx.send(ControlMessage::Stop);
            let _ = join.join();
            info!("scheduler stopped");
        }
    }

    pub fn set_speed(&self, speed: f64) {
        self.handle.set_speed(speed);
    }

    pub fn pause_async(&self) {
        self.handle.pause_async();
    }

    pub fn speed(&self) -> f64 {
        self.handle.speed()
    }

    pub fn fps(&self) -> f64 {
        self.handle.fps()
    }
}

impl Drop for StepScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SchedulerHandle {
    /// Changes the signed speed multiplier. Takes effect before the next step.
    pub fn set_speed(&self, speed: f64) {
        let speed = sanitize_speed(speed);
        let previous = self.inner.state.swap_speed(speed);
        if previous.to_bits() != speed.to_bits() {
            let _ = self.inner.ctrl_tx.send(ControlMessage::SpeedChanged);
        }
    }

    /// Requests a pause. The thread parks once any step in progress returns.
    pub fn pause_async(&self) {
        self.set_speed(0.0);
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.inner.state.speed()
    }

    #[inline]
    pub fn fps(&self) -> f64 {
        self.inner.state.fps
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = &self.inner.state;
        SchedulerStats {
            forward_steps: state.forward_steps.load(Ordering::Relaxed),
            backward_steps: state.backward_steps.load(Ordering::Relaxed),
            idle_wakeups: state.idle_wakeups.load(Ordering::Relaxed),
        }
    }
}

/// Maps NaN and infinities to a pause; finite values pass through.
#[inline]
fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() { speed } else { 0.0 }
}
