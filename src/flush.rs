//! Periodic persistence of dirty stores.
//!
//! A dirty counter is reset the moment its save is issued, not when the
//! save completes. A background save that fails is logged and its changes
//! stay unsaved until the next mutation marks the store dirty again.

use crate::store::Store;
use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Issue a background save for every persistent store with pending changes.
///
/// Returns the number of saves issued. In-memory stores are skipped and
/// keep their counters.
pub fn flush_dirty(stores: &[Arc<Store>]) -> usize {
    let mut issued = 0;
    for store in stores {
        if !store.is_persistent() {
            continue;
        }
        let pending = store.take_dirty();
        if pending == 0 {
            continue;
        }
        tracing::debug!(path = ?store.path(), pending, "flushing store");
        store.save_async();
        issued += 1;
    }
    issued
}

/// Runs [`flush_dirty`] on a timer until shut down or dropped.
pub struct FlushScheduler {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Start flushing `stores` every `interval`.
    pub fn start(interval: Duration, stores: Vec<Arc<Store>>) -> Self {
        let (shutdown, stop) = bounded::<()>(1);
        let ticker = tick(interval);

        let handle = thread::spawn(move || loop {
            select! {
                recv(ticker) -> _ => {
                    flush_dirty(&stores);
                }
                recv(stop) -> _ => break,
            }
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "flush scheduler started");

        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    /// Stop the timer and wait for the scheduler thread to exit.
    ///
    /// Saves already issued keep running on their own threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Disconnecting the channel wakes the scheduler thread.
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("flush scheduler thread panicked");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
