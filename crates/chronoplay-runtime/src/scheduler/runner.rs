use std::{
    sync::{Arc, atomic::Ordering},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use tracing::debug;

use super::{FrameStepper, control::ControlMessage, state::SchedulerState};
use crate::types::{MAX_CATCH_UP_PERIODS, MAX_PERIOD, SPIN_THRESHOLD, SPIN_YIELD_EVERY};

enum WaitOutcome {
    /// Scheduler thread should exit (channel disconnected or Stop received).
    Exit,
    /// Speed changed; caller should re-check state and deadlines.
    SpeedChanged,
    /// The target deadline has been reached.
    DeadlineReached,
}

pub(crate) struct Runner<S: FrameStepper> {
    stepper: S,
    ctrl_rx: Receiver<ControlMessage>,
    state: Arc<SchedulerState>,
    pause_sleep: Duration,
    /// `None` right after start, pause or a speed change: the next step is
    /// scheduled one period from now instead of from a stale timestamp.
    last_step: Option<Instant>,
}

impl<S: FrameStepper> Runner<S> {
    pub(crate) fn new(
        stepper: S,
        ctrl_rx: Receiver<ControlMessage>,
        state: Arc<SchedulerState>,
        pause_sleep: Duration,
    ) -> Self {
        Self {
            stepper,
            ctrl_rx,
            state,
            pause_sleep,
            last_step: None,
        }
    }

    pub(crate) fn run(&mut self) {
        loop {
            while let Ok(msg) = self.ctrl_rx.try_recv() {
                if self.handle_control(msg) {
                    return;
                }
            }

            let speed = self.state.speed();
            if speed == 0.0 {
                self.last_step = None;
                match self.ctrl_rx.recv_timeout(self.pause_sleep) {
                    Ok(msg) => {
                        if self.handle_control(msg) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        self.state.idle_wakeups.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                }
                continue;
            }

            let period = self.period(speed);
            let last_step = match self.last_step {
                None => Instant::now(),
                Some(last) => {
                    if speed > 0.0 {
                        self.stepper.step_forward();
                        self.state.forward_steps.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.stepper.step_backward();
                        self.state.backward_steps.fetch_add(1, Ordering::Relaxed);
                    }

                    let scheduled = last.checked_add(period).unwrap_or(last);
                    let now = Instant::now();
                    // Run back-to-back while slightly late, but never try to
                    // make up more than a few periods.
                    if now.saturating_duration_since(scheduled) > period * MAX_CATCH_UP_PERIODS {
                        now
                    } else {
                        scheduled
                    }
                }
            };
            self.last_step = Some(last_step);

            let deadline = last_step.checked_add(period).unwrap_or(last_step);
            match self.wait_until(deadline) {
                WaitOutcome::Exit => return,
                WaitOutcome::SpeedChanged | WaitOutcome::DeadlineReached => {}
            }
        }
    }

    fn period(&self, speed: f64) -> Duration {
        let rate = self.state.fps * speed.abs();
        Duration::try_from_secs_f64(1.0 / rate)
            .unwrap_or(MAX_PERIOD)
            .min(MAX_PERIOD)
    }

    fn wait_until(&mut self, deadline: Instant) -> WaitOutcome {
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::DeadlineReached;
        }

        // Coarse phase: block on the control channel, leaving a final spin window.
        let remaining = deadline - now;
        if remaining > SPIN_THRESHOLD {
            match self.ctrl_rx.recv_timeout(remaining - SPIN_THRESHOLD) {
                Ok(msg) => return self.wait_outcome(msg),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return WaitOutcome::Exit,
            }
        }

        // Fine phase: spin until the deadline. We still poll control messages
        // to keep the scheduler responsive.
        let mut spins: u32 = 0;
        while Instant::now() < deadline {
            match self.ctrl_rx.try_recv() {
                Ok(msg) => return self.wait_outcome(msg),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return WaitOutcome::Exit,
            }

            std::hint::spin_loop();
            spins = spins.wrapping_add(1);
            if spins.is_multiple_of(SPIN_YIELD_EVERY) {
                thread::yield_now();
            }
        }

        WaitOutcome::DeadlineReached
    }

    fn wait_outcome(&mut self, msg: ControlMessage) -> WaitOutcome {
        if self.handle_control(msg) {
            WaitOutcome::Exit
        } else {
            WaitOutcome::SpeedChanged
        }
    }

    /// Returns `true` when the thread should exit.
    fn handle_control(&mut self, msg: ControlMessage) -> bool {
        match msg {
            ControlMessage::Stop => return true,
            ControlMessage::SpeedChanged => {
                debug!(speed = self.state.speed(), "scheduler speed changed");
                // Re-anchor to avoid a catch-up burst against the old deadline.
                self.last_step = None;
            }
        }

        false
    }
}
