use std::sync::atomic::{AtomicU64, Ordering};

/// State shared between the scheduler thread and its handles.
pub(crate) struct SchedulerState {
    /// Raw bits of the signed speed multiplier.
    speed_bits: AtomicU64,
    pub(crate) fps: f64,
    pub(crate) forward_steps: AtomicU64,
    pub(crate) backward_steps: AtomicU64,
    pub(crate) idle_wakeups: AtomicU64,
}

impl SchedulerState {
    pub(crate) fn new(fps: f64, speed: f64) -> Self {
        Self {
            speed_bits: AtomicU64::new(speed.to_bits()),
            fps,
            forward_steps: AtomicU64::new(0),
            backward_steps: AtomicU64::new(0),
            idle_wakeups: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Acquire))
    }

    /// Stores `speed` and returns the previous value.
    #[inline]
    pub(crate) fn swap_speed(&self, speed: f64) -> f64 {
        f64::from_bits(self.speed_bits.swap(speed.to_bits(), Ordering::AcqRel))
    }
}
