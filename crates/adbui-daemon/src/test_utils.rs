//! Test doubles for the bridge and discovery adapters
//!
//! [`FakeBridge`] behaves like a small in-memory adb server: `connect` adds
//! a connected TCP device, `disconnect` drops it, `restart_server` clears
//! the list. Individual operations can be scripted to fail or stall.
//! [`FakeDiscovery`] hands out subscriptions the test feeds by hand.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use adbui_core::prelude::*;
use adbui_core::{BridgeDevice, BridgeState, NetworkAddress, ServiceAnnouncement, ServiceKind};
use tokio::sync::mpsc;

use crate::adb::BridgeClient;
use crate::mdns::{DiscoverySource, RawServiceEvent};

/// Operation names used to script [`FakeBridge`]
pub const OP_LIST: &str = "list";
pub const OP_PAIR: &str = "pair";
pub const OP_CONNECT: &str = "connect";
pub const OP_DISCONNECT: &str = "disconnect";
pub const OP_DISCONNECT_ALL: &str = "disconnect_all";
pub const OP_RESTART: &str = "restart";

/// A scripted failure; converted into an [`Error`] when consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFailure {
    Network(String),
    Auth(String),
    NotFound(String),
    Unavailable(String),
}

impl FakeFailure {
    fn into_error(self) -> Error {
        match self {
            FakeFailure::Network(m) => Error::network(m),
            FakeFailure::Auth(m) => Error::auth(m),
            FakeFailure::NotFound(m) => Error::not_found(m),
            FakeFailure::Unavailable(m) => Error::bridge_unavailable(m),
        }
    }
}

#[derive(Debug, Default)]
struct FakeBridgeState {
    devices: Vec<BridgeDevice>,
    failures: HashMap<&'static str, VecDeque<FakeFailure>>,
    /// Sticky failure for list_devices (bridge down)
    list_down: Option<String>,
    delays: HashMap<&'static str, Duration>,
    calls: Vec<String>,
    paired: Vec<NetworkAddress>,
}

/// In-memory bridge
#[derive(Debug, Clone, Default)]
pub struct FakeBridge {
    state: Arc<Mutex<FakeBridgeState>>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeBridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the device list
    pub fn set_devices(&self, devices: Vec<BridgeDevice>) {
        self.lock().devices = devices;
    }

    /// Add or replace one device by serial
    pub fn put_device(&self, device: BridgeDevice) {
        let mut state = self.lock();
        state.devices.retain(|d| d.serial != device.serial);
        state.devices.push(device);
    }

    pub fn remove_device(&self, serial: &str) {
        self.lock().devices.retain(|d| d.serial != serial);
    }

    /// Fail the next call of `op` with `failure`
    pub fn fail_next(&self, op: &'static str, failure: FakeFailure) {
        self.lock().failures.entry(op).or_default().push_back(failure);
    }

    /// Make every `list_devices` fail until [`FakeBridge::set_up`]
    pub fn set_down(&self, reason: impl Into<String>) {
        self.lock().list_down = Some(reason.into());
    }

    pub fn set_up(&self) {
        self.lock().list_down = None;
    }

    /// Delay every call of `op`
    pub fn set_delay(&self, op: &'static str, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    /// Recorded calls, formatted as `op target`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .count()
    }

    pub fn paired(&self) -> Vec<NetworkAddress> {
        self.lock().paired.clone()
    }

    /// Record the call and return its scripted delay and failure
    fn begin(&self, op: &'static str, target: &str) -> (Option<Duration>, Option<FakeFailure>) {
        let mut state = self.lock();
        state.calls.push(format!("{} {}", op, target).trim().to_string());
        let delay = state.delays.get(op).copied();
        let failure = state.failures.get_mut(op).and_then(VecDeque::pop_front);
        (delay, failure)
    }

    async fn run(&self, op: &'static str, target: &str) -> Result<()> {
        let (delay, failure) = self.begin(op, target);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

impl BridgeClient for FakeBridge {
    async fn list_devices(&self) -> Result<Vec<BridgeDevice>> {
        self.run(OP_LIST, "").await?;
        let state = self.lock();
        match &state.list_down {
            Some(reason) => Err(Error::bridge_unavailable(reason.clone())),
            None => Ok(state.devices.clone()),
        }
    }

    async fn pair(&self, address: &NetworkAddress, _code: &str) -> Result<()> {
        self.run(OP_PAIR, &address.to_string()).await?;
        self.lock().paired.push(address.clone());
        Ok(())
    }

    async fn connect(&self, address: &NetworkAddress) -> Result<()> {
        self.run(OP_CONNECT, &address.to_string()).await?;
        self.put_device(BridgeDevice::new(
            address.to_string(),
            BridgeState::Connected,
        ));
        Ok(())
    }

    async fn disconnect(&self, target: &str) -> Result<()> {
        self.run(OP_DISCONNECT, target).await?;
        let mut state = self.lock();
        let before = state.devices.len();
        state.devices.retain(|d| d.serial != target);
        if state.devices.len() == before {
            return Err(Error::not_found(format!("no such device '{}'", target)));
        }
        Ok(())
    }

    async fn disconnect_all(&self) -> Result<()> {
        self.run(OP_DISCONNECT_ALL, "").await?;
        self.lock().devices.retain(|d| d.address.is_none());
        Ok(())
    }

    async fn restart_server(&self) -> Result<()> {
        self.run(OP_RESTART, "").await?;
        self.lock().devices.clear();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FakeDiscoveryState {
    current: Option<mpsc::Sender<RawServiceEvent>>,
    subscriptions: usize,
    failures_remaining: usize,
}

/// Hand-fed discovery source
#[derive(Debug, Clone, Default)]
pub struct FakeDiscovery {
    state: Arc<Mutex<FakeDiscoveryState>>,
}

impl FakeDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeDiscoveryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event on the current subscription
    ///
    /// Returns false if nobody is subscribed.
    pub async fn emit(&self, event: RawServiceEvent) -> bool {
        let tx = self.lock().current.clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn resolve(&self, announcement: ServiceAnnouncement) -> bool {
        self.emit(RawServiceEvent::Resolved(announcement)).await
    }

    pub async fn remove(&self, name: &str, service: ServiceKind) -> bool {
        self.emit(RawServiceEvent::Removed {
            name: name.to_string(),
            service,
        })
        .await
    }

    /// Close the current subscription
    pub fn drop_subscription(&self) {
        self.lock().current = None;
    }

    /// Make the next `n` subscribe calls fail
    pub fn fail_next_subscriptions(&self, n: usize) {
        self.lock().failures_remaining = n;
    }

    /// Number of subscribe calls so far, failed ones included
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl DiscoverySource for FakeDiscovery {
    async fn subscribe(&self, _kinds: &[ServiceKind]) -> Result<mpsc::Receiver<RawServiceEvent>> {
        let mut state = self.lock();
        state.subscriptions += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(Error::discovery("fake subscribe failure"));
        }
        let (tx, rx) = mpsc::channel(64);
        state.current = Some(tx);
        Ok(rx)
    }
}

/// Connect-service announcement for tests
pub fn connect_announcement(name: &str, host: &str, port: u16) -> ServiceAnnouncement {
    ServiceAnnouncement::new(name, ServiceKind::Connect, NetworkAddress::new(host, port))
}

/// Pairing-service announcement for tests
pub fn pairing_announcement(name: &str, host: &str, port: u16) -> ServiceAnnouncement {
    ServiceAnnouncement::new(name, ServiceKind::Pairing, NetworkAddress::new(host, port))
}
