//! Contracts shared by the chronoplay runtime: the simulation [`Engine`], the
//! [`SavestateStore`] backend, and the [`SavestateRecord`] they exchange.

pub mod engine;
pub mod error;
pub mod savestate;

pub use engine::{DEFAULT_FPS, Engine, PixelFormat, VideoFrameInfo, VideoRotation, sanitize_fps};
pub use error::{EngineError, StoreError};
pub use savestate::{SAVESTATE_FORMAT_VERSION, SaveType, SavestateRecord, SavestateStore};
