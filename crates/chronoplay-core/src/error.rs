use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by an [`Engine`](crate::Engine) while capturing or
/// restoring its state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine does not support state serialization")]
    Unsupported,

    #[error("state buffer is {actual} bytes, engine expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("engine refused to serialize its state: {0}")]
    Serialize(String),

    #[error("engine refused to restore state: {0}")]
    Deserialize(String),
}

/// Failures reported by a [`SavestateStore`](crate::SavestateStore).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("savestate not found: {id}")]
    NotFound { id: String },

    #[error("session is not persistable (no game path)")]
    NotPersistable,

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode savestate: {0}")]
    Encode(String),

    #[error("failed to decode savestate {id}: {error}")]
    Decode { id: String, error: String },
}
