use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use chronoplay_core::{SavestateRecord, SavestateStore, StoreError};
use parking_lot::Mutex;

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    records: HashMap<String, (PathBuf, SavestateRecord)>,
}

/// Keeps savestates in process memory. Ids are `mem:<n>`.
#[derive(Default)]
pub struct MemorySavestateStore {
    inner: Mutex<MemoryInner>,
}

impl MemorySavestateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every record stored for `game_path`, oldest first.
    pub fn ids_for(&self, game_path: &Path) -> Vec<String> {
        let inner = self.inner.lock();
        let mut ids: Vec<(u64, String)> = inner
            .records
            .iter()
            .filter(|(_, (path, _))| path == game_path)
            .filter_map(|(id, _)| Some((id.strip_prefix("mem:")?.parse().ok()?, id.clone())))
            .collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

impl SavestateStore for MemorySavestateStore {
    fn get_record(&self, id: &str) -> Result<SavestateRecord, StoreError> {
        self.inner
            .lock()
            .records
            .get(id)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    fn add_record(&self, game_path: &Path, record: SavestateRecord) -> Result<String, StoreError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = format!("mem:{}", inner.next_id);
        inner
            .records
            .insert(id.clone(), (game_path.to_path_buf(), record));
        Ok(id)
    }
}
