//! Bridge controller - lifecycle and the line-processing loop
//!
//! State machine: `Idle -> Starting -> Connected -> Closing -> Idle`.
//!
//! `start()` launches the line source and one controller loop, then returns.
//! The loop is the only owner of the slider state tracker: lines arrive
//! through a single channel and are diffed and published one at a time.
//! A stop request or the line source ending (cleanly or with a transport
//! error) tears the source down exactly once and returns the bridge to idle.
//!
//! Lines a source queued before it ended are still processed. On a stop
//! request, queued lines that the loop has not taken are dropped, and their
//! senders are told so through the line receipt.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::EventDispatcher;
use crate::error::BridgeError;
use crate::reload::{ReloadCoordinator, ReloadEpoch};
use crate::slider::{SliderMoveEvent, SliderStateTracker, TrackerSettings};
use crate::transport::{Line, LineReceiver, LineSource};

/// Capacity of the line channel (tokio has no zero-capacity channel)
pub const LINE_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Starting,
    Connected,
    Closing,
}

pub struct BridgeController {
    settings: TrackerSettings,
    dispatcher: Arc<EventDispatcher>,
    reload: Arc<ReloadEpoch>,
    state: Arc<watch::Sender<BridgeState>>,
    stop_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl BridgeController {
    pub fn new(settings: TrackerSettings, dispatcher: Arc<EventDispatcher>) -> Self {
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            settings,
            dispatcher,
            reload: Arc::new(ReloadEpoch::new()),
            state: Arc::new(state),
            stop_tx: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    pub fn reload_epoch(&self) -> Arc<ReloadEpoch> {
        Arc::clone(&self.reload)
    }

    /// Register a move event consumer (see `EventDispatcher::subscribe`)
    pub fn subscribe(&self) -> mpsc::Receiver<SliderMoveEvent> {
        self.dispatcher.subscribe()
    }

    /// Reset slider state `reset_delay` after each notification on `reloads`
    pub fn watch_reloads<T>(
        &self,
        reloads: mpsc::Receiver<T>,
        reset_delay: Duration,
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
    {
        ReloadCoordinator::spawn(reloads, self.reload_epoch(), reset_delay)
    }

    /// Launch `source` and the controller loop. Does not wait for either.
    pub fn start(&self, source: Box<dyn LineSource>) -> Result<(), BridgeError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == BridgeState::Idle {
                *state = BridgeState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(BridgeError::AlreadyRunning);
        }

        let source_name = source.name().to_string();
        info!("Starting bridge on {}", source_name);

        let (line_tx, mut line_rx) = mpsc::channel::<Line>(LINE_CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_tx.lock() = Some(stop_tx);

        let mut source_task = tokio::spawn(source.run(line_tx));
        let mut tracker =
            SliderStateTracker::with_reload_epoch(self.settings.clone(), self.reload_epoch());
        let dispatcher = Arc::clone(&self.dispatcher);
        let state = Arc::clone(&self.state);
        let stop_slot = Arc::clone(&self.stop_tx);

        state.send_replace(BridgeState::Connected);

        tokio::spawn(async move {
            let source_finished = loop {
                tokio::select! {
                    biased;

                    _ = &mut stop_rx => {
                        debug!("Stop signal received");
                        break false;
                    }
                    result = &mut source_task => {
                        match result {
                            Ok(Ok(())) => info!("{} ended", source_name),
                            Ok(Err(e)) => warn!("Transport failure on {}: {}", source_name, e),
                            Err(e) => warn!("{} task failed: {}", source_name, e),
                        }
                        drain_lines(&mut line_rx, &mut tracker, &dispatcher).await;
                        break true;
                    }
                    Some(line) = line_rx.recv() => {
                        handle_line(&mut tracker, &dispatcher, &line.accept()).await;
                    }
                }
            };

            state.send_replace(BridgeState::Closing);
            if !source_finished {
                // Dropping the source task closes its connection or listener
                source_task.abort();
                let _ = source_task.await;
            }
            // Fails any sender still waiting on the loop
            drop(line_rx);
            stop_slot.lock().take();
            info!("{} connection closed", source_name);
            state.send_replace(BridgeState::Idle);
        });

        Ok(())
    }

    /// Ask the controller loop to tear down. No-op when not connected.
    pub fn stop(&self) {
        match self.stop_tx.lock().take() {
            Some(tx) => {
                debug!("Shutting down bridge connection");
                let _ = tx.send(());
            }
            None => debug!("Not currently connected, nothing to stop"),
        }
    }

    /// Wait until the bridge is idle again
    pub async fn wait_until_idle(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == BridgeState::Idle).await;
    }
}

/// Process what a finished source left queued
async fn drain_lines(
    line_rx: &mut LineReceiver,
    tracker: &mut SliderStateTracker,
    dispatcher: &EventDispatcher,
) {
    while let Ok(line) = line_rx.try_recv() {
        handle_line(tracker, dispatcher, &line.accept()).await;
    }
}

async fn handle_line(tracker: &mut SliderStateTracker, dispatcher: &EventDispatcher, line: &str) {
    match tracker.diff(line) {
        Ok(events) => {
            for event in events {
                debug!(
                    "Slider {} moved to {:.2}%",
                    event.slider_index, event.percent_value
                );
                dispatcher.publish(event).await;
            }
        }
        Err(e) => warn!("Dropping malformed line {:?}: {}", line, e),
    }
}
