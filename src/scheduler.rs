//! Flush Scheduler
//!
//! A host-side driver that calls [`Registry::periodic_flush`] on a fixed
//! interval from a background thread. The registry itself never owns a
//! timer; this task is what registers and cancels the periodic callback.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, select, Sender};
use tracing::{debug, warn};

use crate::registry::Registry;

/// Handle to a running periodic flush; cancelled on drop
pub struct FlushTask {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTask {
    /// Start ticking every `interval`
    ///
    /// The task holds the registry weakly and stops on its own once the
    /// registry is gone.
    pub fn spawn(registry: Weak<Registry>, interval: Duration) -> std::io::Result<Self> {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let handle = thread::Builder::new()
            .name("seencache-flush".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        let Some(registry) = registry.upgrade() else {
                            debug!("registry dropped; flush task exiting");
                            break;
                        };
                        registry.periodic_flush();
                    }
                    recv(cancel_rx) -> _ => {
                        debug!("flush task cancelled");
                        break;
                    }
                }
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    /// Stop ticking and wait for an in-flight flush to finish
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the sender disconnects the channel, which also wakes
        // the select
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("flush task panicked");
            }
        }
    }
}

impl Drop for FlushTask {
    fn drop(&mut self) {
        self.stop();
    }
}
