//! Owned background tasks.
//!
//! A [`PeriodicTask`] runs a closure on its own thread every `interval` until it is stopped.
//! Stopping is prompt (the thread waits on a channel rather than sleeping) and joins the
//! thread, so once [`PeriodicTask::stop`] returns no further tick will run. Dropping the handle
//! stops the task.

use crate::error::{Result, VaultError};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Start running `tick` every `interval`. The first tick happens one interval from now.
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread_name = format!("peervault-{}", name);
        let task_name = name.clone();

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                info!("{} task started (every {:?})", task_name, interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => tick(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("{} task stopped", task_name);
            })
            .map_err(VaultError::Io)?;

        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task and wait for its thread to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside its own tick; the loop exits on the next wait.
                return;
            }
            if handle.join().is_err() {
                error!("{} task panicked", self.name);
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
