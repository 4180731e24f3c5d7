//! End-to-end reconciliation tests
//!
//! Drive the full engine (discovery listener, bridge poller, reconciler and
//! command dispatcher) with in-memory fakes standing in for adb and mDNS.

use std::time::Duration;

use adbui_app::config::Settings;
use adbui_app::{Command, Engine};
use adbui_core::{
    BridgeDevice, BridgeState, DeviceIdentity, DiscoveryState, ErrorKind, NetworkAddress,
};
use adbui_daemon::test_utils::{
    connect_announcement, FakeBridge, FakeDiscovery, OP_CONNECT, OP_DISCONNECT, OP_RESTART,
};

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.bridge.poll_interval_ms = 20;
    settings.discovery.eviction_check_ms = 20;
    settings
}

fn addr(s: &str) -> NetworkAddress {
    s.parse().unwrap()
}

async fn start(settings: Settings) -> (Engine, FakeBridge, FakeDiscovery) {
    let bridge = FakeBridge::new();
    let discovery = FakeDiscovery::new();
    let engine = Engine::new(settings, bridge.clone(), Some(discovery.clone()));
    wait_until(|| discovery.is_subscribed()).await;
    (engine, bridge, discovery)
}

async fn wait_until(predicate: impl Fn() -> bool) {
    for _ in 0..500 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn discovery_then_bridge_snapshot_merge_into_one_record() {
    let (mut engine, bridge, discovery) = start(fast_settings()).await;
    let registry = engine.registry().clone();
    let endpoint = addr("192.168.1.5:5555");

    assert!(
        discovery
            .resolve(connect_announcement("pixel7", "192.168.1.5", 5555))
            .await
    );
    wait_until(|| registry.len() == 1).await;

    let record = registry
        .get(&DeviceIdentity::from_address(endpoint.clone()))
        .unwrap();
    assert_eq!(record.bridge_state, BridgeState::Unknown);
    assert_eq!(record.discovery_state, DiscoveryState::Advertising);

    let mut device = BridgeDevice::new("ABC123", BridgeState::Connected);
    device.address = Some(endpoint.clone());
    bridge.set_devices(vec![device]);

    wait_until(|| {
        registry
            .get(&DeviceIdentity::from_serial("ABC123"))
            .is_some_and(|r| r.is_connected())
    })
    .await;

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].identity.serial.as_deref(), Some("ABC123"));
    assert_eq!(snapshot[0].identity.address, Some(endpoint));
    assert_eq!(snapshot[0].discovery_state, DiscoveryState::Advertising);

    engine.shutdown().await;
}

#[tokio::test]
async fn repeated_identical_snapshots_do_not_change_state() {
    let (mut engine, bridge, _discovery) = start(fast_settings()).await;
    let registry = engine.registry().clone();

    bridge.set_devices(vec![BridgeDevice::new("R58M123", BridgeState::Connected)]);
    wait_until(|| registry.len() == 1).await;

    let version = registry.version();
    let before = registry.snapshot();

    // Several more polls of the same list
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(registry.version(), version);
    let after = registry.snapshot();
    assert_eq!(after.len(), 1);
    assert!(after[0].same_state(&before[0]));
    assert!(after[0].last_seen >= before[0].last_seen);

    engine.shutdown().await;
}

#[tokio::test]
async fn second_connect_while_first_in_flight_is_busy() {
    let (mut engine, bridge, discovery) = start(fast_settings()).await;
    let registry = engine.registry().clone();

    discovery
        .resolve(connect_announcement("adb-K1-a", "10.0.0.2", 37000))
        .await;
    wait_until(|| registry.len() == 1).await;

    bridge.set_delay(OP_CONNECT, Duration::from_millis(300));
    let identity = DeviceIdentity::from_address(addr("10.0.0.2:37000"));

    let first = engine.submit_command(Command::Connect {
        identity: identity.clone(),
    });
    wait_until(|| registry.get(&identity).is_some_and(|r| r.is_busy())).await;

    let second = engine.submit_command(Command::Connect {
        identity: identity.clone(),
    });
    let err = second.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Busy));

    // The first call's outcome is the one that lands
    first.await.unwrap().unwrap();
    assert_eq!(bridge.call_count(OP_CONNECT), 1);

    let record = registry.get(&identity).unwrap();
    assert!(record.pending_command.is_none());
    assert!(record.last_error.is_none());
    wait_until(|| registry.get(&identity).is_some_and(|r| r.is_connected())).await;

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connect_past_its_deadline_times_out_and_releases_device() {
    let (mut engine, bridge, discovery) = start(Settings::default()).await;
    let registry = engine.registry().clone();

    discovery
        .resolve(connect_announcement("adb-K2-a", "192.168.1.9", 5555))
        .await;
    wait_until(|| registry.len() == 1).await;

    let identity = DeviceIdentity::from_address(addr("192.168.1.9:5555"));
    let state_before = registry.get(&identity).unwrap().bridge_state;

    // Adapter stalls 15s against the default 10s connect deadline
    bridge.set_delay(OP_CONNECT, Duration::from_secs(15));
    let err = engine
        .submit_command(Command::Connect {
            identity: identity.clone(),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Timeout));

    let record = registry.get(&identity).unwrap();
    assert!(record.pending_command.is_none());
    assert_eq!(record.bridge_state, state_before);
    assert_eq!(
        record.last_error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Timeout)
    );

    engine.shutdown().await;
}

#[tokio::test]
async fn disconnect_during_restart_is_rejected_without_adapter_call() {
    let (mut engine, bridge, _discovery) = start(fast_settings()).await;
    let registry = engine.registry().clone();

    bridge.set_devices(vec![BridgeDevice::new("10.0.0.3:5555", BridgeState::Connected)]);
    wait_until(|| registry.len() == 1).await;

    bridge.set_delay(OP_RESTART, Duration::from_millis(300));
    let restart = engine.submit_command(Command::RestartServer);
    wait_until(|| bridge.call_count(OP_RESTART) == 1).await;

    let err = engine
        .submit_command(Command::Disconnect {
            identity: DeviceIdentity::from_serial("10.0.0.3:5555"),
        })
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ServerRestarting));
    assert_eq!(bridge.call_count(OP_DISCONNECT), 0);

    restart.await.unwrap().unwrap();
    assert!(registry.global_error().is_none());

    engine.shutdown().await;
}

#[tokio::test]
async fn serial_missing_from_next_snapshot_goes_offline() {
    let (mut engine, bridge, _discovery) = start(fast_settings()).await;
    let registry = engine.registry().clone();
    let identity = DeviceIdentity::from_serial("R58M123");

    bridge.set_devices(vec![BridgeDevice::new("R58M123", BridgeState::Connected)]);
    wait_until(|| registry.get(&identity).is_some_and(|r| r.is_connected())).await;

    bridge.remove_device("R58M123");
    wait_until(|| {
        registry
            .get(&identity)
            .is_some_and(|r| r.bridge_state == BridgeState::Offline)
    })
    .await;

    // Still listed: a vanished serial is not forgotten, only marked offline
    assert_eq!(registry.len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn stale_offline_devices_are_evicted_but_connected_ones_stay() {
    let mut settings = fast_settings();
    settings.discovery.stale_timeout_ms = 50;
    settings.discovery.eviction_window_ms = 50;
    let (mut engine, bridge, discovery) = start(settings).await;
    let registry = engine.registry().clone();

    // Connected over the bridge and announced over mDNS
    let mut connected = BridgeDevice::new("adb-KEEP-x._adb-tls-connect._tcp", BridgeState::Connected);
    connected.address = Some(addr("10.0.0.4:40000"));
    bridge.set_devices(vec![connected]);
    discovery
        .resolve(connect_announcement("adb-KEEP-x", "10.0.0.4", 40000))
        .await;

    // Announced only, never seen by the bridge
    discovery
        .resolve(connect_announcement("adb-GONE-y", "10.0.0.5", 40001))
        .await;
    wait_until(|| registry.len() == 2).await;

    discovery.remove("adb-KEEP-x", adbui_core::ServiceKind::Connect).await;
    discovery.remove("adb-GONE-y", adbui_core::ServiceKind::Connect).await;

    wait_until(|| registry.len() == 1).await;
    let remaining = registry.snapshot();
    assert!(remaining[0].is_connected());
    assert_eq!(remaining[0].identity.device_key.as_deref(), Some("KEEP"));

    // Well past several eviction windows
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(registry.len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn discovery_subscription_loss_keeps_bridge_view() {
    let (mut engine, bridge, discovery) = start(fast_settings()).await;
    let registry = engine.registry().clone();

    bridge.set_devices(vec![BridgeDevice::new("R58M123", BridgeState::Connected)]);
    wait_until(|| registry.len() == 1).await;

    discovery.drop_subscription();
    // Listener backs off 1s then resubscribes
    wait_until(|| discovery.subscription_count() >= 2 && discovery.is_subscribed()).await;

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].is_connected());

    engine.shutdown().await;
}
