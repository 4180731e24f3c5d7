//! Discovery Listener - keeps an mDNS subscription alive
//!
//! Wraps a [`DiscoverySource`] and turns its raw resolve/remove stream into
//! [`DiscoveryEvent`]s. When the underlying subscription ends, the listener
//! reports [`DiscoveryEvent::SubscriptionLost`] and resubscribes with
//! exponential backoff instead of failing.

use std::collections::HashSet;
use std::time::Duration;

use adbui_core::prelude::*;
use adbui_core::{DiscoveryEvent, ServiceKind};
use adbui_daemon::{DiscoverySource, RawServiceEvent};
use tokio::sync::{mpsc, watch};

/// Doubling delay with an upper bound
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

pub struct DiscoveryListener<S> {
    source: S,
    kinds: Vec<ServiceKind>,
    backoff: Backoff,
    /// Instances resolved on the current subscription
    known: HashSet<(ServiceKind, String)>,
}

impl<S> DiscoveryListener<S>
where
    S: DiscoverySource + Send + Sync + 'static,
{
    pub fn new(source: S, backoff: Backoff) -> Self {
        Self {
            source,
            kinds: ServiceKind::ALL.to_vec(),
            backoff,
            known: HashSet::new(),
        }
    }

    /// Translate one raw event, tracking which instances are already known
    fn translate(&mut self, raw: RawServiceEvent) -> DiscoveryEvent {
        match raw {
            RawServiceEvent::Resolved(ann) => {
                if self.known.insert((ann.service, ann.name.clone())) {
                    DiscoveryEvent::Announced(ann)
                } else {
                    DiscoveryEvent::Updated(ann)
                }
            }
            RawServiceEvent::Removed { name, service } => {
                self.known.remove(&(service, name.clone()));
                DiscoveryEvent::Removed { name, service }
            }
        }
    }

    /// Run until shutdown or until the event receiver goes away
    pub async fn run(mut self, tx: mpsc::Sender<DiscoveryEvent>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Discovery listener started");

        loop {
            match self.source.subscribe(&self.kinds).await {
                Ok(mut rx) => {
                    debug!("Subscribed to {} service types", self.kinds.len());
                    loop {
                        tokio::select! {
                            raw = rx.recv() => match raw {
                                Some(raw) => {
                                    self.backoff.reset();
                                    let event = self.translate(raw);
                                    if tx.send(event).await.is_err() {
                                        debug!("Discovery receiver dropped");
                                        return;
                                    }
                                }
                                None => break,
                            },
                            _ = shutdown_rx.changed() => {
                                info!("Discovery listener stopped");
                                return;
                            }
                        }
                    }

                    // Resolutions are reported afresh on the next subscription
                    self.known.clear();
                    debug!("mDNS browse stream ended");
                    let reason = "browse stream ended".to_string();
                    if tx
                        .send(DiscoveryEvent::SubscriptionLost { reason })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    warn!("mDNS subscribe failed: {}", e);
                }
            }

            let delay = self.backoff.next_delay();
            debug!("Resubscribing in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    info!("Discovery listener stopped");
                    return;
                }
            }
        }
    }
}
