//! Configuration reload coordination
//!
//! A reload must clear the recorded slider count so the next line resends every
//! slider. The session-binding layer re-acquires its bindings on the same
//! reload, so the clear is delayed by a short, fixed amount.
//!
//! ## Epoch-based resets
//! Each reload bumps a generation counter and schedules a reset tagged with it.
//! A reset whose generation is stale when its delay elapses is a no-op, so
//! overlapping reloads collapse onto the most recent one. The reset itself is
//! only *requested* here; the controller loop applies it on its next line.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default delay between a reload notification and the slider state reset
pub const DEFAULT_RESET_DELAY_MS: u64 = 50;

/// Shared reload generation counter and pending-reset flag
#[derive(Debug, Default)]
pub struct ReloadEpoch {
    current: AtomicU64,
    reset_pending: AtomicBool,
}

impl ReloadEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reload and return its generation
    pub fn begin_reload(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current reload generation (0 before any reload)
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Request a reset on behalf of `epoch`.
    ///
    /// Returns false (and requests nothing) if a newer reload has begun since.
    pub fn fire(&self, epoch: u64) -> bool {
        if self.current() != epoch {
            return false;
        }
        self.reset_pending.store(true, Ordering::SeqCst);
        true
    }

    /// Consume a pending reset request, if any
    pub fn take_reset(&self) -> bool {
        self.reset_pending.swap(false, Ordering::SeqCst)
    }
}

/// Turns reload notifications into delayed slider state resets
pub struct ReloadCoordinator;

impl ReloadCoordinator {
    /// Observe `notifications` until the sender side closes.
    ///
    /// Every notification spawns its own delayed reset task. Scheduled tasks are
    /// never cancelled; a stale one simply does nothing when it fires.
    pub fn spawn<T>(
        mut notifications: mpsc::Receiver<T>,
        epoch: Arc<ReloadEpoch>,
        reset_delay: Duration,
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
    {
        tokio::spawn(async move {
            while notifications.recv().await.is_some() {
                let generation = epoch.begin_reload();
                debug!(
                    "Reload #{} observed, resetting slider state in {:?}",
                    generation, reset_delay
                );

                let epoch = Arc::clone(&epoch);
                tokio::spawn(async move {
                    tokio::time::sleep(reset_delay).await;
                    if epoch.fire(generation) {
                        info!("Slider state reset requested after reload #{}", generation);
                    } else {
                        debug!("Skipping stale reset for reload #{}", generation);
                    }
                });
            }
            debug!("Reload notification channel closed");
        })
    }
}
