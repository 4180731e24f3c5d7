//! Engine - wires the core tasks together for the TUI and headless runners
//!
//! The Engine owns the device registry, spawns the discovery listener, the
//! bridge poller and the reconciler, and exposes the command dispatcher. It
//! also owns the TEA message channel and the shutdown signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adbui_core::prelude::*;
use adbui_core::{BridgeHealth, DeviceId, DeviceIdentity, DeviceRecord};
use adbui_daemon::{BridgeClient, DiscoverySource};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::discovery::{Backoff, DiscoveryListener};
use crate::dispatcher::{Command, CommandDispatcher, CommandSubmitter, CommandTimeouts};
use crate::handler::{self, UpdateAction};
use crate::message::Message;
use crate::poller::{BridgeStatusPoller, PollTrigger};
use crate::reconcile::{self, Reconciler};
use crate::registry::{now, DeviceRegistry, EvictionPolicy};
use crate::signals;
use crate::state::AppState;

/// How long shutdown waits for each background task
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Plain durations and switches the core tasks run with
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub list_timeout: Duration,
    pub unavailable_threshold: u32,
    pub eviction: EvictionPolicy,
    pub backoff: Backoff,
    pub timeouts: CommandTimeouts,
    pub discovery_enabled: bool,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            list_timeout: settings.list_timeout(),
            unavailable_threshold: settings.bridge.unavailable_threshold,
            eviction: settings.eviction_policy(),
            backoff: settings.backoff(),
            timeouts: settings.command_timeouts(),
            discovery_enabled: settings.discovery.enabled,
        }
    }
}

/// Orchestration engine for adbui.
pub struct Engine {
    /// TEA application state (the Model)
    pub state: AppState,

    /// Sender half of the message channel; clone it for input sources
    pub msg_tx: mpsc::Sender<Message>,

    /// Receiver half, drained by the frontend loop
    pub msg_rx: mpsc::Receiver<Message>,

    /// Send `true` to stop every background task
    pub shutdown_tx: watch::Sender<bool>,

    pub shutdown_rx: watch::Receiver<bool>,

    pub settings: Settings,

    registry: Arc<DeviceRegistry>,
    commands: Arc<dyn CommandSubmitter>,
    poll_trigger: PollTrigger,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    signal_task: JoinHandle<()>,
    /// Registry version last copied into `state`
    seen_version: Option<u64>,
}

impl Engine {
    /// Create the engine and start its background tasks.
    ///
    /// Must be called inside a tokio runtime. `discovery = None` runs
    /// without mDNS; the registry is then fed by the bridge alone.
    pub fn new<C, S>(settings: Settings, client: C, discovery: Option<S>) -> Self
    where
        C: BridgeClient + Send + Sync + 'static,
        S: DiscoverySource + Send + Sync + 'static,
    {
        let config = EngineConfig::from_settings(&settings);
        let state = AppState::with_settings(&settings);

        let (msg_tx, msg_rx) = mpsc::channel::<Message>(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let registry = Arc::new(DeviceRegistry::new());
        let client = Arc::new(client);
        let mut tasks = Vec::new();

        // Discovery -> reconciler
        let (discovery_tx, discovery_rx) = mpsc::channel(256);
        match discovery.filter(|_| config.discovery_enabled) {
            Some(source) => {
                let listener = DiscoveryListener::new(source, config.backoff.clone());
                tasks.push((
                    "discovery",
                    tokio::spawn(listener.run(discovery_tx, shutdown_rx.clone())),
                ));
            }
            None => {
                info!("mDNS discovery disabled");
                drop(discovery_tx);
            }
        }

        // Bridge poller -> reconciler
        let (bridge_tx, bridge_rx) = mpsc::channel(64);
        let poller =
            BridgeStatusPoller::new(client.clone(), config.poll_interval, config.list_timeout);
        let poll_trigger = poller.trigger();
        tasks.push((
            "poller",
            tokio::spawn(poller.run(bridge_tx, shutdown_rx.clone())),
        ));

        let reconciler = Reconciler::new(registry.clone(), config.eviction)
            .with_unavailable_threshold(config.unavailable_threshold);
        tasks.push((
            "reconciler",
            tokio::spawn(reconciler.run(discovery_rx, bridge_rx, shutdown_rx.clone())),
        ));

        let commands: Arc<dyn CommandSubmitter> = Arc::new(CommandDispatcher::new(
            client,
            registry.clone(),
            config.timeouts,
        ));

        let signal_task = signals::spawn_signal_handler(msg_tx.clone());

        Self {
            state,
            msg_tx,
            msg_rx,
            shutdown_tx,
            shutdown_rx,
            settings,
            registry,
            commands,
            poll_trigger,
            tasks,
            signal_task,
            seen_version: None,
        }
    }

    /// Process a single message through the TEA update cycle.
    pub fn process_message(&mut self, msg: Message) {
        let mut msg = Some(msg);
        while let Some(m) = msg {
            let result = handler::update(&mut self.state, m);
            if let Some(action) = result.action {
                self.handle_action(action);
            }
            msg = result.message;
        }
    }

    /// Drain and process all pending messages from the channel.
    ///
    /// Returns the number of messages processed.
    pub fn drain_pending_messages(&mut self) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.process_message(msg);
            count += 1;
        }
        count
    }

    /// Copy the registry into `state` if it changed since the last call.
    ///
    /// Appearances, removals and bridge health transitions are written to
    /// the log pane. Returns true when anything was copied.
    pub fn sync_registry(&mut self) -> bool {
        let version = self.registry.version();
        if self.seen_version == Some(version) {
            return false;
        }
        self.seen_version = Some(version);

        let devices = self.registry.snapshot();
        self.log_device_changes(&devices);
        self.state.set_devices(devices);

        let health = self.registry.bridge_health();
        if health != self.state.bridge_health {
            match &health {
                BridgeHealth::Unavailable { reason } => {
                    self.state.log_error(format!("adb server unavailable: {}", reason))
                }
                BridgeHealth::Available
                    if matches!(self.state.bridge_health, BridgeHealth::Unavailable { .. }) =>
                {
                    self.state.log_info("adb server available again")
                }
                _ => {}
            }
            self.state.bridge_health = health;
        }
        self.state.global_error = self.registry.global_error();
        true
    }

    fn log_device_changes(&mut self, devices: &[DeviceRecord]) {
        let before: HashMap<DeviceId, String> = self
            .state
            .devices
            .iter()
            .map(|d| (d.id, d.display_name()))
            .collect();
        let after: HashMap<DeviceId, String> =
            devices.iter().map(|d| (d.id, d.display_name())).collect();

        for device in devices {
            if !before.contains_key(&device.id) {
                self.state
                    .log_info(format!("Device appeared: {}", device.display_name()));
            }
        }
        for device in &self.state.devices.clone() {
            if !after.contains_key(&device.id) {
                self.state
                    .log_info(format!("Device removed: {}", device.display_name()));
            }
        }
    }

    fn handle_action(&mut self, action: UpdateAction) {
        match action {
            UpdateAction::Submit(command) => self.submit(command),
            UpdateAction::Refresh => self.poll_trigger.fire(),
            UpdateAction::ConnectAddress(address) => {
                reconcile::register_target(&self.registry, address.clone(), now());
                self.submit(Command::Connect {
                    identity: DeviceIdentity::from_address(address),
                });
            }
        }
    }

    /// Submit a command; its outcome comes back as `Message::CommandCompleted`
    fn submit(&self, command: Command) {
        let description = command.describe();
        let rx = self.commands.submit(command);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let outcome = match rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("command task ended unexpectedly".to_string()),
            };
            let _ = tx
                .send(Message::CommandCompleted {
                    description,
                    outcome,
                })
                .await;
        });
    }

    /// Submit a command and get its result directly (headless and tests)
    pub fn submit_command(&self, command: Command) -> oneshot::Receiver<Result<()>> {
        self.commands.submit(command)
    }

    /// Read access to the registry
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Request an immediate bridge poll
    pub fn refresh(&self) {
        self.poll_trigger.fire();
    }

    pub fn msg_sender(&self) -> mpsc::Sender<Message> {
        self.msg_tx.clone()
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn should_quit(&self) -> bool {
        self.state.should_quit()
    }

    /// Stop every background task and wait for them to finish
    pub async fn shutdown(&mut self) {
        info!("Engine shutting down");
        let _ = self.shutdown_tx.send(true);
        self.signal_task.abort();

        for (name, handle) in self.tasks.drain(..) {
            match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!("{} task stopped", name),
                Ok(Err(e)) => warn!("{} task panicked: {}", name, e),
                Err(_) => warn!("{} task did not stop in time", name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbui_core::{BridgeDevice, BridgeState};
    use adbui_daemon::test_utils::{FakeBridge, FakeDiscovery, OP_CONNECT};

    use crate::input_key::InputKey;

    async fn wait_for(engine: &mut Engine, predicate: impl Fn(&Engine) -> bool) {
        for _ in 0..200 {
            engine.drain_pending_messages();
            engine.sync_registry();
            if predicate(engine) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_engine_reflects_bridge_devices() {
        let bridge = FakeBridge::new();
        bridge.set_devices(vec![BridgeDevice::new("R5CT", BridgeState::Connected)]);
        let mut engine = Engine::new(Settings::default(), bridge, None::<FakeDiscovery>);

        wait_for(&mut engine, |e| e.state.devices.len() == 1).await;
        assert!(engine.state.devices[0].is_connected());
        assert_eq!(engine.state.bridge_health, BridgeHealth::Available);
        assert!(engine
            .state
            .logs
            .iter()
            .any(|l| l.message.contains("Device appeared")));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_sync_registry_skips_unchanged_version() {
        let bridge = FakeBridge::new();
        let mut engine = Engine::new(Settings::default(), bridge, None::<FakeDiscovery>);
        wait_for(&mut engine, |e| e.state.bridge_health == BridgeHealth::Available).await;

        // Nothing changes between identical empty polls
        assert!(!engine.sync_registry());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_manual_connect_through_dialog() {
        let bridge = FakeBridge::new();
        let mut engine = Engine::new(Settings::default(), bridge.clone(), None::<FakeDiscovery>);

        engine.process_message(Message::Key(InputKey::Char('c')));
        for c in "10.0.0.7:5555".chars() {
            engine.process_message(Message::Key(InputKey::Char(c)));
        }
        engine.process_message(Message::Key(InputKey::Enter));

        wait_for(&mut engine, |e| {
            e.state.logs.iter().any(|l| l.message.ends_with(": ok"))
        })
        .await;
        assert_eq!(bridge.call_count(OP_CONNECT), 1);
        assert!(engine.state.devices.iter().any(|d| d.is_connected()));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_quit_message_sets_should_quit() {
        let mut engine = Engine::new(Settings::default(), FakeBridge::new(), None::<FakeDiscovery>);
        engine.msg_tx.send(Message::Quit).await.unwrap();
        engine.drain_pending_messages();
        assert!(engine.should_quit());
        engine.shutdown().await;
    }
}
