//! Persisted point-in-time snapshots and the store contract that owns them.

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

#[cfg(feature = "savestate-serde")]
use serde::{Deserialize, Serialize};

use crate::{
    engine::{VideoFrameInfo, sanitize_fps},
    error::StoreError,
};

/// Version of the record layout. Bumped whenever fields change.
pub const SAVESTATE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "savestate-serde", derive(Serialize, Deserialize))]
pub enum SaveType {
    /// Created periodically in the background.
    Auto,
    /// Created on user request.
    #[default]
    Manual,
}

/// A named snapshot of engine state plus descriptive metadata.
///
/// Created by the playback controller, owned by a [`SavestateStore`] once
/// persisted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "savestate-serde", derive(Serialize, Deserialize))]
pub struct SavestateRecord {
    pub format_version: u32,
    pub save_type: SaveType,
    pub label: String,
    pub caption: String,
    pub created_utc: SystemTime,
    pub game_file_name: String,
    /// Total elapsed simulation frames at capture time.
    pub timestamp_frames: u64,
    /// `timestamp_frames / native_fps`, in seconds.
    pub timestamp_wall_clock: f64,
    pub engine_id: String,
    pub engine_version: String,
    /// Opaque engine state, exactly `memory_size()` bytes.
    pub memory: Vec<u8>,
    pub video: Option<VideoFrameInfo>,
}

impl Default for SavestateRecord {
    fn default() -> Self {
        Self {
            format_version: SAVESTATE_FORMAT_VERSION,
            save_type: SaveType::default(),
            label: String::new(),
            caption: String::new(),
            created_utc: UNIX_EPOCH,
            game_file_name: String::new(),
            timestamp_frames: 0,
            timestamp_wall_clock: 0.0,
            engine_id: String::new(),
            engine_version: String::new(),
            memory: Vec::new(),
            video: None,
        }
    }
}

impl SavestateRecord {
    #[inline]
    pub fn memory_size(&self) -> usize {
        self.memory.len()
    }

    /// Sets both timestamps from an elapsed frame count.
    pub fn set_timestamp(&mut self, frames: u64, fps: f64) {
        self.timestamp_frames = frames;
        self.timestamp_wall_clock = frames as f64 / sanitize_fps(fps);
    }

    /// Seconds since the Unix epoch at creation, `0` for records created
    /// before 1970 or never stamped.
    pub fn created_unix_secs(&self) -> u64 {
        self.created_utc
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(feature = "savestate-postcard")]
impl SavestateRecord {
    pub fn to_postcard_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_stdvec(self)
    }

    pub fn from_postcard_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Persistence backend for savestates.
///
/// Stores are shared between the UI thread and background savers, so every
/// method takes `&self`.
pub trait SavestateStore: Send + Sync {
    /// Returns an empty record to be filled by the caller.
    fn create_record(&self) -> SavestateRecord {
        SavestateRecord::default()
    }

    /// Reads back the record identified by `id`.
    fn get_record(&self, id: &str) -> Result<SavestateRecord, StoreError>;

    /// Persists `record` for the game at `game_path` and returns its id.
    fn add_record(&self, game_path: &Path, record: SavestateRecord) -> Result<String, StoreError>;
}
