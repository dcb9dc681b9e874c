//! Periodic background savestates.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use tracing::{debug, info};

/// What the auto-saver saves.
pub trait AutoSaveTarget: Send + Sync + 'static {
    /// Whether a save is worth taking right now (e.g. playing and changed).
    fn autosave_enabled(&self) -> bool;

    /// Creates an auto savestate and returns its id.
    fn create_autosave(&self) -> Option<String>;
}

/// Calls [`AutoSaveTarget::create_autosave`] every `interval` until dropped.
pub struct AutoSave {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl AutoSave {
    pub fn start(interval: Duration, target: Arc<dyn AutoSaveTarget>) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name("chronoplay-autosave".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    }

                    if !target.autosave_enabled() {
                        continue;
                    }
                    match target.create_autosave() {
                        Some(id) => info!(%id, "auto savestate created"),
                        None => debug!("auto savestate skipped"),
                    }
                }
            })?;

        Ok(Self {
            stop_tx,
            join: Some(join),
        })
    }

    /// Stops the auto-saver, interrupting its wait.
    pub fn stop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.stop_tx.try_send(());
            let _ = join.join();
        }
    }
}

impl Drop for AutoSave {
    fn drop(&mut self) {
        self.stop();
    }
}
