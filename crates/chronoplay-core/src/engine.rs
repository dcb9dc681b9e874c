//! The simulation core driven by the playback runtime.
//!
//! The runtime never looks inside engine state. It only asks the engine to
//! advance one logical frame and to copy its complete state into (or out of) a
//! caller-provided byte buffer whose size the engine reports up front.

use std::path::Path;

#[cfg(feature = "savestate-serde")]
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Frame rate used whenever an engine reports a non-positive or non-finite rate.
pub const DEFAULT_FPS: f64 = 60.0;

/// Capability set of a frame-stepped simulation.
///
/// Implementations are moved onto the scheduler thread, so they must be `Send`.
/// Every method is called with exclusive access; implementations need no
/// internal locking.
pub trait Engine: Send {
    /// Advances the simulation by exactly one logical frame.
    ///
    /// Audio and video side effects belong to the engine.
    fn run_step(&mut self);

    /// Number of bytes a full state capture occupies.
    ///
    /// `0` means state capture is unsupported. Rewind and savestates degrade to
    /// no-ops in that case.
    fn serialize_size(&self) -> usize;

    /// Writes the full state into `buf`, which is exactly
    /// [`serialize_size`](Self::serialize_size) bytes long.
    fn serialize(&mut self, buf: &mut [u8]) -> Result<(), EngineError>;

    /// Restores the full state from `buf`.
    fn deserialize(&mut self, buf: &[u8]) -> Result<(), EngineError>;

    /// Native frame rate in frames per second.
    fn frame_rate(&self) -> f64;

    /// Path of the loaded game, or `None` for standalone (non-persistable)
    /// sessions.
    fn game_path(&self) -> Option<&Path>;

    /// Stable identifier of the engine implementation, stored in savestates.
    fn engine_id(&self) -> &str {
        "unknown"
    }

    fn engine_version(&self) -> &str {
        ""
    }

    /// Describes the most recent video frame, for savestate previews.
    fn video_frame_info(&self) -> Option<VideoFrameInfo> {
        None
    }
}

/// Returns `fps` if usable as a step rate, [`DEFAULT_FPS`] otherwise.
#[inline]
pub fn sanitize_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        DEFAULT_FPS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate-serde", derive(Serialize, Deserialize))]
pub enum PixelFormat {
    #[default]
    Unknown,
    Rgb555,
    Rgb565,
    Xrgb8888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Rgb555 | Self::Rgb565 => 2,
            Self::Xrgb8888 => 4,
        }
    }
}

/// Clockwise rotation applied when presenting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate-serde", derive(Serialize, Deserialize))]
pub enum VideoRotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

/// Descriptive metadata of a video frame. Used only for previews, never for
/// replay.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "savestate-serde", derive(Serialize, Deserialize))]
pub struct VideoFrameInfo {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f32,
    pub rotation: VideoRotation,
}
