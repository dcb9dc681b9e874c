#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use chronoplay_core::{Engine, EngineError};
use ctor::ctor;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[ctor]
fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub const STATE_SIZE: usize = 64;

/// Engine whose whole state is a frame counter, padded to `size` bytes.
pub struct CounterEngine {
    pub counter: u64,
    size: usize,
    fps: f64,
    game: Option<PathBuf>,
    pub fail_serialize: Arc<AtomicBool>,
    pub fail_deserialize: Arc<AtomicBool>,
}

impl CounterEngine {
    pub fn new(fps: f64) -> Self {
        Self {
            counter: 0,
            size: STATE_SIZE,
            fps,
            game: Some(PathBuf::from("/games/counter.bin")),
            fail_serialize: Arc::new(AtomicBool::new(false)),
            fail_deserialize: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn standalone(mut self) -> Self {
        self.game = None;
        self
    }

    /// `0` disables state capture.
    pub fn with_state_size(mut self, size: usize) -> Self {
        assert!(size == 0 || size >= 8);
        self.size = size;
        self
    }
}

impl Engine for CounterEngine {
    fn run_step(&mut self) {
        self.counter += 1;
    }

    fn serialize_size(&self) -> usize {
        self.size
    }

    fn serialize(&mut self, buf: &mut [u8]) -> Result<(), EngineError> {
        if self.size == 0 {
            return Err(EngineError::Unsupported);
        }
        if self.fail_serialize.load(Ordering::Acquire) {
            return Err(EngineError::Serialize("injected failure".to_string()));
        }
        if buf.len() != self.size {
            return Err(EngineError::SizeMismatch {
                expected: self.size,
                actual: buf.len(),
            });
        }
        buf.fill(self.counter as u8);
        buf[..8].copy_from_slice(&self.counter.to_le_bytes());
        Ok(())
    }

    fn deserialize(&mut self, buf: &[u8]) -> Result<(), EngineError> {
        if self.fail_deserialize.load(Ordering::Acquire) {
            return Err(EngineError::Deserialize("injected failure".to_string()));
        }
        if buf.len() != self.size || self.size == 0 {
            return Err(EngineError::SizeMismatch {
                expected: self.size,
                actual: buf.len(),
            });
        }
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&buf[..8]);
        self.counter = u64::from_le_bytes(counter);
        Ok(())
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn game_path(&self) -> Option<&Path> {
        self.game.as_deref()
    }

    fn engine_id(&self) -> &str {
        "counter"
    }
}

pub fn counter_of(memory: &[u8]) -> u64 {
    let mut counter = [0u8; 8];
    counter.copy_from_slice(&memory[..8]);
    u64::from_le_bytes(counter)
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
