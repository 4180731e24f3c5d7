//! Reconciliation Engine - merges discovery and bridge feeds into the registry
//!
//! The [`Reconciler`] is the single consumer of both event streams. Events
//! are applied in arrival order per stream; the two streams are not ordered
//! against each other. Command outcomes enter through
//! [`apply_command_effect`], manual targets through [`register_target`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use adbui_core::prelude::*;
use adbui_core::{
    BridgeDevice, BridgeEvent, BridgeHealth, BridgeState, DeviceIdentity, DeviceRecord,
    DiscoveryEvent, DiscoveryState, NetworkAddress, ServiceAnnouncement, ServiceKind, Transport,
};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::registry::{now, DeviceRegistry, DeviceUpdate, EvictionPolicy, Upserted};

/// Consecutive failed polls before the bridge is reported unavailable
pub const DEFAULT_UNAVAILABLE_THRESHOLD: u32 = 3;

/// Registry tag for an announced mDNS instance
pub fn service_tag(kind: ServiceKind, name: &str) -> String {
    format!("{}:{}", kind.short_name(), name)
}

/// Targeted registry updates following a successful command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEffect {
    Paired {
        identity: DeviceIdentity,
    },
    Connected {
        identity: DeviceIdentity,
        address: NetworkAddress,
    },
    Disconnected {
        identity: DeviceIdentity,
    },
    ServerRestarted,
    AllDisconnected,
}

/// Stateful consumer of the discovery and bridge streams
pub struct Reconciler {
    registry: Arc<DeviceRegistry>,
    policy: EvictionPolicy,
    unavailable_threshold: u32,
    consecutive_failures: u32,
}

impl Reconciler {
    pub fn new(registry: Arc<DeviceRegistry>, policy: EvictionPolicy) -> Self {
        Self {
            registry,
            policy,
            unavailable_threshold: DEFAULT_UNAVAILABLE_THRESHOLD,
            consecutive_failures: 0,
        }
    }

    pub fn with_unavailable_threshold(mut self, threshold: u32) -> Self {
        self.unavailable_threshold = threshold.max(1);
        self
    }

    // ─────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────

    pub fn apply_discovery(&mut self, event: DiscoveryEvent, now: Instant) {
        match event {
            DiscoveryEvent::Announced(ann) => {
                let result = self.apply_announcement(&ann, now);
                if result.created {
                    info!(
                        "Discovered {} ({} at {})",
                        ann.device_name.as_deref().unwrap_or(&ann.name),
                        ann.service.short_name(),
                        ann.address
                    );
                }
            }
            DiscoveryEvent::Updated(ann) => {
                self.apply_announcement(&ann, now);
            }
            DiscoveryEvent::Removed { name, service } => self.apply_removal(&name, service, now),
            DiscoveryEvent::SubscriptionLost { reason } => {
                warn!("{}", Error::subscription_lost(reason));
                // Nothing is being refreshed until the listener resubscribes
                for record in self.registry.snapshot() {
                    if !record.active_services.is_empty() {
                        self.registry.upsert(
                            &record.identity,
                            DeviceUpdate {
                                clear_services: true,
                                passive: true,
                                ..Default::default()
                            },
                            now,
                        );
                    }
                }
            }
        }
    }

    fn apply_announcement(&self, ann: &ServiceAnnouncement, now: Instant) -> Upserted {
        let mut update = DeviceUpdate {
            name: ann.device_name.clone(),
            api_level: ann.api_level,
            discovery_state: Some(DiscoveryState::Advertising),
            add_service: Some(service_tag(ann.service, &ann.name)),
            ..Default::default()
        };
        match ann.service {
            // Only a paired device advertises the connect service
            ServiceKind::Connect => update.paired = Some(true),
            ServiceKind::Pairing => update.pairing_address = Some(Some(ann.address.clone())),
        }
        self.registry.upsert(&ann.identity(), update, now)
    }

    fn apply_removal(&self, name: &str, service: ServiceKind, now: Instant) {
        let tag = service_tag(service, name);
        let Some(record) = self.registry.find_by_service(&tag) else {
            debug!("Removal of unknown instance {}", tag);
            return;
        };

        let mut update = DeviceUpdate {
            remove_service: Some(tag),
            passive: true,
            ..Default::default()
        };
        if service == ServiceKind::Pairing {
            // Pairing mode ended on the device
            update.pairing_address = Some(None);
        }
        debug!("{} stopped advertising {}", record.display_name(), name);
        self.registry.upsert(&record.identity, update, now);
    }

    // ─────────────────────────────────────────────────────────────
    // Bridge
    // ─────────────────────────────────────────────────────────────

    pub fn apply_bridge(&mut self, event: BridgeEvent, now: Instant) {
        match event {
            BridgeEvent::Snapshot(devices) => self.apply_snapshot(&devices, now),
            BridgeEvent::Unavailable { reason } => {
                self.consecutive_failures += 1;
                debug!(
                    "Bridge poll failed ({} in a row): {}",
                    self.consecutive_failures, reason
                );
                let health = if self.consecutive_failures >= self.unavailable_threshold {
                    BridgeHealth::Unavailable { reason }
                } else {
                    BridgeHealth::Degraded {
                        failures: self.consecutive_failures,
                    }
                };
                if matches!(health, BridgeHealth::Unavailable { .. })
                    && !matches!(self.registry.bridge_health(), BridgeHealth::Unavailable { .. })
                {
                    warn!("adb server unavailable");
                }
                self.registry.set_bridge_health(health);
            }
        }
    }

    fn apply_snapshot(&mut self, devices: &[BridgeDevice], now: Instant) {
        if self.consecutive_failures >= self.unavailable_threshold {
            info!("adb server available again");
        }
        self.consecutive_failures = 0;
        self.registry.set_bridge_health(BridgeHealth::Available);

        let present: HashSet<&str> = devices.iter().map(|d| d.serial.as_str()).collect();

        for device in devices {
            let update = DeviceUpdate {
                model: device.model.clone(),
                transport: Some(device.transport),
                bridge_state: Some(device.state),
                paired: (device.state != BridgeState::Unknown).then_some(true),
                ..Default::default()
            };
            let result = self.registry.upsert(&device.identity(), update, now);
            if result.created {
                info!("adb reports {} ({})", device.serial, device.state);
            }
        }

        // Serials missing from the snapshot are offline now, not after a delay
        for record in self.registry.snapshot() {
            let Some(serial) = record.identity.serial.as_deref() else {
                continue;
            };
            if present.contains(serial) || record.bridge_state == BridgeState::Offline {
                continue;
            }
            debug!("{} absent from adb device list", serial);
            self.registry.upsert(
                &record.identity,
                DeviceUpdate {
                    bridge_state: Some(BridgeState::Offline),
                    passive: true,
                    ..Default::default()
                },
                now,
            );
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Periodic maintenance
    // ─────────────────────────────────────────────────────────────

    /// Run staleness marking and eviction
    pub fn tick(&mut self, now: Instant) -> Vec<DeviceRecord> {
        self.registry.mark_stale(now, self.policy.stale_timeout);
        let evicted = self.registry.evict_stale(now, self.policy.eviction_window);
        for record in &evicted {
            info!("Forgetting {}", record.display_name());
        }
        evicted
    }

    /// Consume both streams until shutdown
    ///
    /// A closed stream is ignored from then on; the loop only ends on the
    /// shutdown signal.
    pub async fn run(
        mut self,
        mut discovery_rx: mpsc::Receiver<DiscoveryEvent>,
        mut bridge_rx: mpsc::Receiver<BridgeEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut eviction = tokio::time::interval(self.policy.check_interval);
        eviction.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut discovery_open = true;
        let mut bridge_open = true;

        info!("Reconciler started");

        loop {
            tokio::select! {
                event = discovery_rx.recv(), if discovery_open => match event {
                    Some(event) => self.apply_discovery(event, now()),
                    None => {
                        debug!("Discovery stream closed");
                        discovery_open = false;
                    }
                },
                event = bridge_rx.recv(), if bridge_open => match event {
                    Some(event) => self.apply_bridge(event, now()),
                    None => {
                        debug!("Bridge stream closed");
                        bridge_open = false;
                    }
                },
                _ = eviction.tick() => {
                    self.tick(now());
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }
}

/// Register a typed `host:port` so a manual connect has a record to act on
pub fn register_target(registry: &DeviceRegistry, address: NetworkAddress, now: Instant) -> Upserted {
    let identity = DeviceIdentity::from_address(address);
    let result = registry.upsert(&identity, DeviceUpdate::default(), now);
    if result.created {
        info!("Registered manual target {}", identity);
    }
    result
}

/// Reflect a successful command in the registry before the next poll
pub fn apply_command_effect(registry: &DeviceRegistry, effect: CommandEffect, now: Instant) {
    match effect {
        CommandEffect::Paired { identity } => {
            registry.upsert(
                &identity,
                DeviceUpdate {
                    paired: Some(true),
                    pairing_address: Some(None),
                    ..Default::default()
                },
                now,
            );
        }
        CommandEffect::Connected { identity, address } => {
            // `adb connect host:port` names a device by that address unless
            // the bridge already knows it under an mDNS or hardware serial
            let named_by_address = identity
                .serial
                .as_deref()
                .map_or(true, |serial| serial.parse::<NetworkAddress>().is_ok());
            let identity = if named_by_address {
                identity.with_serial(Some(address.to_string()))
            } else {
                identity
            };
            registry.upsert(
                &identity,
                DeviceUpdate {
                    bridge_state: Some(BridgeState::Connected),
                    transport: Some(Transport::Tcp),
                    paired: Some(true),
                    ..Default::default()
                },
                now,
            );
        }
        CommandEffect::Disconnected { identity } => {
            registry.upsert(
                &identity,
                DeviceUpdate {
                    bridge_state: Some(BridgeState::Offline),
                    ..Default::default()
                },
                now,
            );
        }
        CommandEffect::ServerRestarted => {
            mark_offline_where(registry, now, |r| r.bridge_state != BridgeState::Unknown);
        }
        CommandEffect::AllDisconnected => {
            mark_offline_where(registry, now, |r| {
                r.bridge_state == BridgeState::Connected
                    && matches!(r.transport, Some(Transport::Tcp | Transport::Mdns))
            });
        }
    }
}

fn mark_offline_where(
    registry: &DeviceRegistry,
    now: Instant,
    predicate: impl Fn(&DeviceRecord) -> bool,
) {
    for record in registry.snapshot().iter().filter(|r| predicate(r)) {
        registry.upsert(
            &record.identity,
            DeviceUpdate {
                bridge_state: Some(BridgeState::Offline),
                passive: true,
                ..Default::default()
            },
            now,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(s: &str) -> NetworkAddress {
        s.parse().unwrap()
    }

    fn reconciler() -> (Reconciler, Arc<DeviceRegistry>) {
        let registry = Arc::new(DeviceRegistry::new());
        (
            Reconciler::new(registry.clone(), EvictionPolicy::default()),
            registry,
        )
    }

    fn connect_ann(name: &str, address: &str) -> ServiceAnnouncement {
        ServiceAnnouncement::new(name, ServiceKind::Connect, addr(address))
    }

    #[test]
    fn test_announcement_creates_advertising_record() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        let ann = connect_ann("pixel7", "192.168.1.5:5555").with_device_name(Some("pixel7".into()));
        rec.apply_discovery(DiscoveryEvent::Announced(ann), t0);

        let records = registry.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].discovery_state, DiscoveryState::Advertising);
        assert_eq!(records[0].bridge_state, BridgeState::Unknown);
        assert!(records[0].paired);
        assert_eq!(records[0].display_name(), "pixel7");
    }

    #[test]
    fn test_pairing_announcement_and_removal() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        let ann = ServiceAnnouncement::new(
            "adb-KEY1-abc",
            ServiceKind::Pairing,
            addr("10.0.0.2:41000"),
        );
        rec.apply_discovery(DiscoveryEvent::Announced(ann), t0);
        let record = registry.get(&DeviceIdentity::from_device_key("KEY1")).unwrap();
        assert_eq!(record.pairing_address, Some(addr("10.0.0.2:41000")));
        assert!(record.identity.address.is_none());

        rec.apply_discovery(
            DiscoveryEvent::Removed {
                name: "adb-KEY1-abc".into(),
                service: ServiceKind::Pairing,
            },
            t0,
        );
        let record = registry.get(&DeviceIdentity::from_device_key("KEY1")).unwrap();
        assert!(record.pairing_address.is_none());
        assert_eq!(record.discovery_state, DiscoveryState::Advertising);
    }

    #[test]
    fn test_connect_removal_does_not_change_state() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_discovery(
            DiscoveryEvent::Announced(connect_ann("adb-KEY1-abc", "10.0.0.2:37000")),
            t0,
        );
        let before = registry.snapshot();
        rec.apply_discovery(
            DiscoveryEvent::Removed {
                name: "adb-KEY1-abc".into(),
                service: ServiceKind::Connect,
            },
            t0 + Duration::from_secs(1),
        );
        let after = registry.snapshot();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].discovery_state, DiscoveryState::Advertising);
        assert_eq!(after[0].last_seen, before[0].last_seen);
        assert!(after[0].active_services.is_empty());
    }

    #[test]
    fn test_snapshot_merges_by_reported_address() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_discovery(
            DiscoveryEvent::Announced(connect_ann("pixel7", "192.168.1.5:5555")),
            t0,
        );

        let mut device = BridgeDevice::new("ABC123", BridgeState::Connected);
        device.address = Some(addr("192.168.1.5:5555"));
        device.device_key = None;
        rec.apply_bridge(BridgeEvent::Snapshot(vec![device]), t0);

        let records = registry.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bridge_state, BridgeState::Connected);
        assert_eq!(records[0].identity.serial.as_deref(), Some("ABC123"));
        assert_eq!(records[0].identity.address, Some(addr("192.168.1.5:5555")));
    }

    #[test]
    fn test_mdns_serial_merges_by_device_key() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_discovery(
            DiscoveryEvent::Announced(connect_ann("adb-R5CT-xyz", "10.0.0.2:37000")),
            t0,
        );
        rec.apply_bridge(
            BridgeEvent::Snapshot(vec![BridgeDevice::new(
                "adb-R5CT-xyz._adb-tls-connect._tcp",
                BridgeState::Connected,
            )]),
            t0,
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].status(), adbui_core::DeviceStatus::Connected);
    }

    #[test]
    fn test_absent_serial_goes_offline_immediately() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_bridge(
            BridgeEvent::Snapshot(vec![BridgeDevice::new("10.0.0.2:5555", BridgeState::Connected)]),
            t0,
        );
        rec.apply_bridge(BridgeEvent::Snapshot(vec![]), t0 + Duration::from_secs(2));

        let record = registry.get(&DeviceIdentity::from_serial("10.0.0.2:5555")).unwrap();
        assert_eq!(record.bridge_state, BridgeState::Offline);
    }

    #[test]
    fn test_identical_snapshot_is_idempotent() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        let snapshot = vec![
            BridgeDevice::new("10.0.0.2:5555", BridgeState::Connected),
            BridgeDevice::new("emulator-5554", BridgeState::Offline),
        ];
        rec.apply_bridge(BridgeEvent::Snapshot(snapshot.clone()), t0);
        let version = registry.version();
        let before = registry.snapshot();

        rec.apply_bridge(BridgeEvent::Snapshot(snapshot), t0 + Duration::from_secs(2));
        assert_eq!(registry.version(), version);
        let after = registry.snapshot();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert!(a.same_state(b));
        }
    }

    #[test]
    fn test_unavailable_threshold() {
        let (rec, registry) = reconciler();
        let mut rec = rec.with_unavailable_threshold(2);
        let t0 = Instant::now();
        rec.apply_bridge(
            BridgeEvent::Snapshot(vec![BridgeDevice::new("ABC", BridgeState::Connected)]),
            t0,
        );

        let down = || BridgeEvent::Unavailable {
            reason: "daemon not running".into(),
        };
        rec.apply_bridge(down(), t0);
        assert_eq!(registry.bridge_health(), BridgeHealth::Degraded { failures: 1 });
        rec.apply_bridge(down(), t0);
        assert!(matches!(
            registry.bridge_health(),
            BridgeHealth::Unavailable { .. }
        ));
        // Last known state survives the outage
        let record = registry.get(&DeviceIdentity::from_serial("ABC")).unwrap();
        assert_eq!(record.bridge_state, BridgeState::Connected);

        rec.apply_bridge(
            BridgeEvent::Snapshot(vec![BridgeDevice::new("ABC", BridgeState::Connected)]),
            t0,
        );
        assert_eq!(registry.bridge_health(), BridgeHealth::Available);
    }

    #[test]
    fn test_subscription_lost_lets_records_go_stale() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_discovery(
            DiscoveryEvent::Announced(connect_ann("adb-K-x", "10.0.0.2:37000")),
            t0,
        );
        rec.apply_discovery(
            DiscoveryEvent::SubscriptionLost {
                reason: "interface down".into(),
            },
            t0 + Duration::from_secs(1),
        );
        assert!(registry.snapshot()[0].active_services.is_empty());

        rec.tick(t0 + Duration::from_secs(40));
        assert_eq!(registry.snapshot()[0].discovery_state, DiscoveryState::Stale);
    }

    #[test]
    fn test_tick_evicts_gone_devices() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_discovery(
            DiscoveryEvent::Announced(connect_ann("adb-K-x", "10.0.0.2:37000")),
            t0,
        );
        rec.apply_discovery(
            DiscoveryEvent::Removed {
                name: "adb-K-x".into(),
                service: ServiceKind::Connect,
            },
            t0,
        );
        rec.tick(t0 + Duration::from_secs(30));
        assert_eq!(registry.len(), 1);
        let evicted = rec.tick(t0 + Duration::from_secs(90));
        assert_eq!(evicted.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_target_reuses_existing_record() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_discovery(
            DiscoveryEvent::Announced(connect_ann("pixel", "10.0.0.2:5555")),
            t0,
        );
        let result = register_target(&registry, addr("10.0.0.2:5555"), t0);
        assert!(!result.created);
        assert_eq!(registry.len(), 1);

        let result = register_target(&registry, addr("10.0.0.7:5555"), t0);
        assert!(result.created);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_connect_effect_sets_serial_and_state() {
        let registry = DeviceRegistry::new();
        let t0 = Instant::now();
        let target = addr("10.0.0.2:5555");
        register_target(&registry, target.clone(), t0);

        apply_command_effect(
            &registry,
            CommandEffect::Connected {
                identity: DeviceIdentity::from_address(target.clone()),
                address: target,
            },
            t0,
        );
        let record = registry.get(&DeviceIdentity::from_serial("10.0.0.2:5555")).unwrap();
        assert_eq!(record.bridge_state, BridgeState::Connected);
        assert_eq!(record.transport, Some(Transport::Tcp));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reconnect_keeps_one_record_per_device() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        let mdns_serial = "adb-KEY1-abc._adb-tls-connect._tcp";
        rec.apply_discovery(
            DiscoveryEvent::Announced(connect_ann("adb-KEY1-abc", "10.0.0.2:37000")),
            t0,
        );
        rec.apply_bridge(
            BridgeEvent::Snapshot(vec![BridgeDevice::new(mdns_serial, BridgeState::Connected)]),
            t0,
        );
        assert_eq!(registry.len(), 1);

        let identity = registry.snapshot()[0].identity.clone();
        apply_command_effect(
            &registry,
            CommandEffect::Disconnected {
                identity: identity.clone(),
            },
            t0,
        );
        apply_command_effect(
            &registry,
            CommandEffect::Connected {
                identity,
                address: addr("10.0.0.2:37000"),
            },
            t0,
        );
        let record = registry.snapshot()[0].clone();
        assert_eq!(record.identity.serial.as_deref(), Some(mdns_serial));
        assert_eq!(record.bridge_state, BridgeState::Connected);

        // adb now lists the device under the address it was connected through
        let t1 = t0 + Duration::from_secs(2);
        rec.apply_discovery(
            DiscoveryEvent::Updated(connect_ann("adb-KEY1-abc", "10.0.0.2:37000")),
            t1,
        );
        rec.apply_bridge(
            BridgeEvent::Snapshot(vec![BridgeDevice::new("10.0.0.2:37000", BridgeState::Connected)]),
            t1,
        );

        let records = registry.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bridge_state, BridgeState::Connected);
        assert_eq!(records[0].identity.device_key.as_deref(), Some("KEY1"));
        assert_eq!(records[0].identity.address, Some(addr("10.0.0.2:37000")));
    }

    /// Deterministic xorshift stream, so a failing seed replays exactly
    struct Steps(u64);

    impl Steps {
        fn pick(&mut self, bound: usize) -> usize {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            (self.0 % bound as u64) as usize
        }
    }

    fn assert_identities_unique(registry: &DeviceRegistry, seed: u64, step: usize) {
        let records = registry.snapshot();
        for (i, a) in records.iter().enumerate() {
            for b in &records[i + 1..] {
                let (x, y) = (&a.identity, &b.identity);
                assert!(
                    x.serial.is_none() || x.serial != y.serial,
                    "seed {seed} step {step}: serial shared by {x:?} and {y:?}"
                );
                assert!(
                    x.device_key.is_none() || x.device_key != y.device_key,
                    "seed {seed} step {step}: device key shared by {x:?} and {y:?}"
                );
                assert!(
                    x.address.is_none() || x.address != y.address,
                    "seed {seed} step {step}: address shared by {x:?} and {y:?}"
                );
            }
        }
    }

    #[test]
    fn test_identities_stay_unique_across_event_sequences() {
        const DEVICES: [(&str, &str); 2] = [("KEY1", "adb-KEY1-abc"), ("KEY2", "adb-KEY2-def")];
        const ADDRESSES: [&str; 2] = ["10.0.0.2:37000", "10.0.0.3:37000"];

        for seed in [0x9e37_79b9_7f4a_7c15, 0xdead_beef, 0x1234_5678_9abc, 42] {
            let (mut rec, registry) = reconciler();
            let mut steps = Steps(seed);
            let t0 = Instant::now();

            for step in 0..300 {
                let now = t0 + Duration::from_millis(step as u64 * 500);
                let (key, instance) = DEVICES[steps.pick(DEVICES.len())];
                let address = ADDRESSES[steps.pick(ADDRESSES.len())];
                let known = registry
                    .get(&DeviceIdentity::from_device_key(key))
                    .map(|r| r.identity);

                match steps.pick(8) {
                    0 => rec.apply_discovery(
                        DiscoveryEvent::Announced(connect_ann(instance, address)),
                        now,
                    ),
                    1 => rec.apply_discovery(
                        DiscoveryEvent::Updated(connect_ann(instance, address)),
                        now,
                    ),
                    2 => rec.apply_discovery(
                        DiscoveryEvent::Removed {
                            name: instance.into(),
                            service: ServiceKind::Connect,
                        },
                        now,
                    ),
                    3 => rec.apply_bridge(
                        BridgeEvent::Snapshot(vec![BridgeDevice::new(
                            format!("{instance}._adb-tls-connect._tcp"),
                            BridgeState::Connected,
                        )]),
                        now,
                    ),
                    4 => rec.apply_bridge(
                        BridgeEvent::Snapshot(vec![BridgeDevice::new(
                            address,
                            BridgeState::Connected,
                        )]),
                        now,
                    ),
                    5 => rec.apply_bridge(BridgeEvent::Snapshot(vec![]), now),
                    6 => {
                        let identity = known.unwrap_or_else(|| {
                            DeviceIdentity::from_device_key(key).with_address(Some(addr(address)))
                        });
                        apply_command_effect(
                            &registry,
                            CommandEffect::Connected {
                                identity,
                                address: addr(address),
                            },
                            now,
                        );
                    }
                    _ => {
                        if let Some(identity) = known {
                            apply_command_effect(
                                &registry,
                                CommandEffect::Disconnected { identity },
                                now,
                            );
                        }
                    }
                }
                assert_identities_unique(&registry, seed, step);
            }
        }
    }

    #[test]
    fn test_all_disconnected_spares_usb() {
        let (mut rec, registry) = reconciler();
        let t0 = Instant::now();
        rec.apply_bridge(
            BridgeEvent::Snapshot(vec![
                BridgeDevice::new("10.0.0.2:5555", BridgeState::Connected),
                BridgeDevice::new("R5CT1234", BridgeState::Connected),
            ]),
            t0,
        );
        apply_command_effect(&registry, CommandEffect::AllDisconnected, t0);

        let tcp = registry.get(&DeviceIdentity::from_serial("10.0.0.2:5555")).unwrap();
        let usb = registry.get(&DeviceIdentity::from_serial("R5CT1234")).unwrap();
        assert_eq!(tcp.bridge_state, BridgeState::Offline);
        assert_eq!(usb.bridge_state, BridgeState::Connected);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let registry = Arc::new(DeviceRegistry::new());
        let rec = Reconciler::new(registry.clone(), EvictionPolicy::default());
        let (dtx, drx) = mpsc::channel(8);
        let (btx, brx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(rec.run(drx, brx, shutdown_rx));
        btx.send(BridgeEvent::Snapshot(vec![BridgeDevice::new(
            "ABC",
            BridgeState::Connected,
        )]))
        .await
        .unwrap();
        drop(dtx);

        // Wait for the event to land
        for _ in 0..50 {
            if !registry.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
