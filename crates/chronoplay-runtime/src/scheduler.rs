//! Dedicated timing thread that steps a simulation forward or backward.
//!
//! The step rate is `fps * |speed|`. A speed of `0` parks the thread on a long,
//! interruptible wait; any speed change or stop request wakes it immediately
//! through the control channel.

mod control;
mod handle;
mod runner;
mod state;

pub use handle::{SchedulerHandle, SchedulerStats, StepScheduler};

/// Callbacks invoked on the scheduler thread.
///
/// Steps are expected to be short and non-blocking; a stop request does not
/// interrupt a step in progress.
pub trait FrameStepper: Send + 'static {
    fn step_forward(&mut self);
    fn step_backward(&mut self);
}

/// A [`FrameStepper`] built from two closures.
pub struct FnStepper<F, B> {
    forward: F,
    backward: B,
}

impl<F, B> FrameStepper for FnStepper<F, B>
where
    F: FnMut() + Send + 'static,
    B: FnMut() + Send + 'static,
{
    fn step_forward(&mut self) {
        (self.forward)()
    }

    fn step_backward(&mut self) {
        (self.backward)()
    }
}

pub fn stepper_fn<F, B>(forward: F, backward: B) -> FnStepper<F, B>
where
    F: FnMut() + Send + 'static,
    B: FnMut() + Send + 'static,
{
    FnStepper { forward, backward }
}
