use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chronoplay_core::{SavestateRecord, SavestateStore, StoreError};
use sha1::{Digest, Sha1};
use tracing::debug;

const SAVESTATE_EXTENSION: &str = "sav";
/// Gives up on finding a free file name after this many collisions.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Stores one postcard-encoded record per file.
///
/// Layout: `<root>/<game stem>-<hash>/<created secs>-<n>.sav`, where `<hash>`
/// is a short SHA-1 of the full game path so that games with the same file
/// name in different folders do not share a directory. The id of a record is
/// its file path.
pub struct FileSavestateStore {
    root: PathBuf,
}

impl FileSavestateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every savestate of `game_path`.
    pub fn game_dir(&self, game_path: &Path) -> PathBuf {
        let mut hasher = Sha1::new();
        hasher.update(game_path.to_string_lossy().as_bytes());
        let hash: [u8; 20] = hasher.finalize().into();

        let stem = game_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "game".to_string());
        self.root
            .join(format!("{stem}-{}", hex::encode(&hash[..4])))
    }

    fn create_unique(dir: &Path, created_secs: u64) -> Result<(PathBuf, fs::File), StoreError> {
        for n in 0..MAX_NAME_ATTEMPTS {
            let path = dir.join(format!("{created_secs}-{n}.{SAVESTATE_EXTENSION}"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Err(StoreError::Io {
            path: dir.to_path_buf(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "no free savestate file name"),
        })
    }
}

impl SavestateStore for FileSavestateStore {
    fn get_record(&self, id: &str) -> Result<SavestateRecord, StoreError> {
        let path = Path::new(id);
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound { id: id.to_string() },
            _ => StoreError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        SavestateRecord::from_postcard_bytes(&bytes).map_err(|e| StoreError::Decode {
            id: id.to_string(),
            error: e.to_string(),
        })
    }

    fn add_record(&self, game_path: &Path, record: SavestateRecord) -> Result<String, StoreError> {
        if game_path.as_os_str().is_empty() {
            return Err(StoreError::NotPersistable);
        }
        let bytes = record
            .to_postcard_bytes()
            .map_err(|e| StoreError::Encode(e.to_string()))?;

        let dir = self.game_dir(game_path);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let (path, mut file) = Self::create_unique(&dir, record.created_unix_secs())?;
        if let Err(source) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(StoreError::Io { path, source });
        }

        debug!(path = %path.display(), bytes = bytes.len(), "savestate written");
        Ok(path.to_string_lossy().into_owned())
    }
}
