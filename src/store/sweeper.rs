//! Background Sweep Task
//!
//! Periodically runs the expiration and capacity passes for a store until the store
//! closes or is dropped.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, Instrument, Span};

use crate::error::Result;
use crate::store::lru::LruShared;

// == Sweeper ==
/// Handle to a running sweep task.
///
/// The task runs on its own thread inside a current-thread tokio runtime, so stores
/// can be created from plain synchronous code.
#[derive(Debug)]
pub(crate) struct Sweeper {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns a sweep task over `shared` ticking every `interval`.
    ///
    /// Only a weak reference is held; once the store is gone the task exits on its
    /// next tick.
    pub(crate) fn spawn(shared: Weak<LruShared>, interval: Duration) -> Result<Self> {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let span = Span::current();

        let handle = thread::Builder::new()
            .name("cache-sweeper".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!("Failed to build sweeper runtime: {}", err);
                        return;
                    }
                };
                runtime.block_on(sweep_loop(shared, interval, shutdown_rx).instrument(span));
            })?;

        Ok(Self { shutdown, handle })
    }

    /// Signals the task to stop and waits for it to exit.
    ///
    /// Called from the sweep thread itself (a listener closing its own store) the
    /// signal is sent without joining.
    pub(crate) fn shutdown(self) {
        // Err means the task already exited
        let _ = self.shutdown.send(());
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            error!("Sweeper thread panicked");
        }
    }
}

async fn sweep_loop(
    shared: Weak<LruShared>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!(
        "Starting cache sweeper with interval of {} ms",
        interval.as_millis()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Cache sweeper stopped");
                break;
            }
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    debug!("Store dropped, cache sweeper exiting");
                    break;
                };
                let removed = shared.run_eviction_pass();
                if removed > 0 {
                    info!("Cache sweep: removed {} entries", removed);
                } else {
                    debug!("Cache sweep: nothing to remove");
                }
            }
        }
    }
}
