//! Rewind settings and their change notifications.
//!
//! [`Settings`] is the shared, observable source of truth. Each subscriber
//! gets its own channel and receives a copy of the new values on every change.
//! Subscribers whose receiver was dropped are pruned on the next broadcast.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, bounded, select, unbounded};
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub rewind_enabled: bool,
    pub max_rewind_time_sec: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            rewind_enabled: true,
            max_rewind_time_sec: 60,
        }
    }
}

#[derive(Default)]
struct SettingsInner {
    values: RwLock<PlaybackSettings>,
    subscribers: Mutex<Vec<Sender<PlaybackSettings>>>,
}

#[derive(Clone, Default)]
pub struct Settings {
    inner: Arc<SettingsInner>,
}

impl Settings {
    pub fn new(values: PlaybackSettings) -> Self {
        Self {
            inner: Arc::new(SettingsInner {
                values: RwLock::new(values),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn get(&self) -> PlaybackSettings {
        *self.inner.values.read()
    }

    pub fn rewind_enabled(&self) -> bool {
        self.inner.values.read().rewind_enabled
    }

    pub fn max_rewind_time_sec(&self) -> u32 {
        self.inner.values.read().max_rewind_time_sec
    }

    /// Returns a receiver that gets the full settings after every change.
    pub fn subscribe(&self) -> Receiver<PlaybackSettings> {
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Replaces all values, notifying subscribers when anything changed.
    pub fn set(&self, values: PlaybackSettings) {
        self.update(|v| *v = values);
    }

    /// Edits the values in place, notifying subscribers when anything changed.
    ///
    /// The broadcast happens under the write lock, so subscribers see changes
    /// in the order they were written and the last message always matches
    /// [`get`](Self::get).
    pub fn update(&self, edit: impl FnOnce(&mut PlaybackSettings)) {
        let mut guard = self.inner.values.write();
        let before = *guard;
        edit(&mut *guard);
        if *guard != before {
            self.broadcast(*guard);
        }
    }

    fn broadcast(&self, values: PlaybackSettings) {
        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(values).is_ok());
    }
}

/// Background thread applying settings changes as they arrive.
///
/// Bursts of changes are coalesced: only the latest values are applied.
pub(crate) struct SettingsWatcher {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl SettingsWatcher {
    pub(crate) fn spawn<F>(rx: Receiver<PlaybackSettings>, mut on_change: F) -> std::io::Result<Self>
    where
        F: FnMut(PlaybackSettings) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name("chronoplay-settings".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(rx) -> msg => match msg {
                            Ok(values) => {
                                let latest = rx.try_iter().last().unwrap_or(values);
                                on_change(latest);
                            }
                            Err(_) => return,
                        },
                        recv(stop_rx) -> _ => return,
                    }
                }
            })?;

        Ok(Self {
            stop_tx,
            join: Some(join),
        })
    }
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
