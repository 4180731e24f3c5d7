//! Bridge Status Poller - periodic `adb devices -l`
//!
//! Emits one [`BridgeEvent`] per poll: a full snapshot on success, or
//! `Unavailable` when the adapter fails or exceeds the list timeout. Polling
//! errors never escape the loop.

use std::sync::Arc;
use std::time::Duration;

use adbui_core::prelude::*;
use adbui_core::BridgeEvent;
use adbui_daemon::BridgeClient;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::MissedTickBehavior;

/// Wakes the poller for an immediate out-of-schedule poll
#[derive(Debug, Clone, Default)]
pub struct PollTrigger(Arc<Notify>);

impl PollTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a poll; repeated requests before the poller wakes coalesce
    pub fn fire(&self) {
        self.0.notify_one();
    }

    async fn fired(&self) {
        self.0.notified().await;
    }
}

pub struct BridgeStatusPoller<C> {
    client: Arc<C>,
    interval: Duration,
    list_timeout: Duration,
    trigger: PollTrigger,
}

impl<C> BridgeStatusPoller<C>
where
    C: BridgeClient + Send + Sync + 'static,
{
    pub fn new(client: Arc<C>, interval: Duration, list_timeout: Duration) -> Self {
        Self {
            client,
            interval,
            list_timeout,
            trigger: PollTrigger::new(),
        }
    }

    /// Share an externally owned trigger (manual refresh)
    pub fn with_trigger(mut self, trigger: PollTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn trigger(&self) -> PollTrigger {
        self.trigger.clone()
    }

    /// One poll, bounded by the list timeout
    pub async fn poll_once(&self) -> BridgeEvent {
        match tokio::time::timeout(self.list_timeout, self.client.list_devices()).await {
            Ok(Ok(devices)) => {
                trace!("adb reports {} devices", devices.len());
                BridgeEvent::Snapshot(devices)
            }
            Ok(Err(e)) => BridgeEvent::Unavailable {
                reason: e.to_string(),
            },
            Err(_) => BridgeEvent::Unavailable {
                reason: Error::timeout("devices", self.list_timeout).to_string(),
            },
        }
    }

    /// Poll on the interval (first poll immediately) until shutdown
    pub async fn run(self, tx: mpsc::Sender<BridgeEvent>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Bridge poller started ({:?} interval)", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.fired() => {
                    debug!("Manual refresh requested");
                    ticker.reset();
                }
                _ = shutdown_rx.changed() => break,
            }

            let event = tokio::select! {
                event = self.poll_once() => event,
                _ = shutdown_rx.changed() => break,
            };

            if tx.send(event).await.is_err() {
                debug!("Bridge event receiver dropped");
                break;
            }
        }

        info!("Bridge poller stopped");
    }
}
