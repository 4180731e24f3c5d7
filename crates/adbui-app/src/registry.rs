//! Device Registry - the single authoritative map of merged device state
//!
//! One mutex guards every record. It is held only for the duration of a
//! merge, acquire or release, never across an adapter call. Callers get
//! cloned [`DeviceRecord`]s; live state never leaves this module.
//!
//! Identity resolution: an incoming [`DeviceIdentity`] matches every record
//! sharing a populated field. The primary match is chosen by serial, then
//! device key, then address. Remaining matches are merged into it unless
//! they carry a conflicting serial or device key, in which case they are a
//! different device and lose the shared address or serial. Two records that
//! both hold a command lease are not merged until one of them is released.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use adbui_core::prelude::*;
use adbui_core::{
    is_network_serial, BridgeHealth, BridgeState, CommandKind, CommandToken, DeviceId,
    DeviceIdentity, DeviceRecord, DiscoveryState, LastError, NetworkAddress, PendingCommand,
    Transport,
};

/// Current time on the tokio clock, so paused-time tests move it too
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Partial update merged into a record by [`DeviceRegistry::upsert`]
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub model: Option<String>,
    pub api_level: Option<u32>,
    /// `Some(None)` clears the pairing endpoint
    pub pairing_address: Option<Option<NetworkAddress>>,
    pub transport: Option<Transport>,
    pub paired: Option<bool>,
    pub discovery_state: Option<DiscoveryState>,
    pub bridge_state: Option<BridgeState>,
    /// Mark an mDNS instance as announced (refreshes discovery)
    pub add_service: Option<String>,
    pub remove_service: Option<String>,
    pub clear_services: bool,
    /// Derived update, not an observation: leaves `last_seen` alone
    pub passive: bool,
}

/// Result of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub id: DeviceId,
    pub created: bool,
}

/// A granted per-device command slot
#[derive(Debug, Clone)]
pub struct CommandLease {
    pub token: CommandToken,
    /// The record as of acquisition
    pub record: DeviceRecord,
}

/// How a command ended, as recorded by [`DeviceRegistry::release_command`]
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Succeeded,
    Failed(LastError),
    /// The command future was dropped before completing
    Abandoned,
}

/// Durations governing staleness and eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// No discovery refresh for this long marks a record `Stale`
    pub stale_timeout: Duration,
    /// How long a record must be gone from both sources before removal
    pub eviction_window: Duration,
    /// How often the reconciler runs staleness and eviction
    pub check_interval: Duration,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_secs(30),
            eviction_window: Duration::from_secs(60),
            check_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<DeviceId, DeviceRecord>,
    next_id: u64,
    next_token: u64,
    version: u64,
    bridge_health: BridgeHealth,
    global_error: Option<LastError>,
}

/// Thread-safe device registry
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: Mutex<Inner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────

    /// Consistent copy of every record, ordered by [`DeviceId`]
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.lock().records.values().cloned().collect()
    }

    /// Monotonic counter advanced by every observable change
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// The record an identity currently resolves to
    pub fn get(&self, identity: &DeviceIdentity) -> Option<DeviceRecord> {
        let inner = self.lock();
        let id = inner.primary_match(identity)?;
        inner.records.get(&id).cloned()
    }

    pub fn get_by_id(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.lock().records.get(&id).cloned()
    }

    /// The record currently announcing the tagged mDNS instance
    pub fn find_by_service(&self, service_tag: &str) -> Option<DeviceRecord> {
        self.lock()
            .records
            .values()
            .find(|r| r.active_services.contains(service_tag))
            .cloned()
    }

    pub fn bridge_health(&self) -> BridgeHealth {
        self.lock().bridge_health.clone()
    }

    pub fn global_error(&self) -> Option<LastError> {
        self.lock().global_error.clone()
    }

    // ─────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────

    /// Merge `update` into the record `identity` resolves to, creating one
    /// if nothing matches
    pub fn upsert(&self, identity: &DeviceIdentity, update: DeviceUpdate, now: Instant) -> Upserted {
        let mut inner = self.lock();

        let (id, claim, created) = match inner.resolve_and_merge(identity) {
            Some((id, claim)) => (id, claim, false),
            None => {
                inner.next_id += 1;
                let id = DeviceId(inner.next_id);
                let record = DeviceRecord::new(id, identity.clone(), now);
                inner.records.insert(id, record);
                inner.version += 1;
                debug!("Registry: created {} for {}", id, identity);
                (id, identity.clone(), true)
            }
        };

        let changed = match inner.records.get_mut(&id) {
            Some(record) => {
                let before = record.clone();
                record.identity = record.identity.union(&claim);
                apply_update(record, update, now);
                !before.same_state(record)
            }
            None => false,
        };
        if changed {
            inner.version += 1;
        }

        Upserted { id, created }
    }

    /// Atomically claim the device for one command
    ///
    /// Fails with `Busy` if another command holds it and `NotFound` if the
    /// identity resolves to no record. Neither failure mutates anything.
    pub fn try_acquire_command(
        &self,
        identity: &DeviceIdentity,
        kind: CommandKind,
        now: Instant,
    ) -> Result<CommandLease> {
        let mut inner = self.lock();
        let id = inner
            .primary_match(identity)
            .ok_or_else(|| Error::not_found(format!("unknown device {}", identity)))?;

        inner.next_token += 1;
        let token = CommandToken(inner.next_token);

        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("unknown device {}", identity)))?;

        if let Some(pending) = &record.pending_command {
            return Err(Error::busy(format!(
                "{} ({} in progress)",
                record.display_name(),
                pending.kind
            )));
        }

        record.pending_command = Some(PendingCommand {
            token,
            kind,
            started_at: now,
        });
        let record = record.clone();
        inner.version += 1;

        Ok(CommandLease { token, record })
    }

    /// Clear the device's pending command and record the outcome
    ///
    /// Returns false (and logs) if `token` is not the current holder.
    /// A failure leaves every field but `last_error` untouched.
    pub fn release_command(
        &self,
        identity: &DeviceIdentity,
        token: CommandToken,
        outcome: ReleaseOutcome,
    ) -> bool {
        let mut inner = self.lock();

        let holds = |r: &DeviceRecord| r.pending_command.as_ref().map(|p| p.token) == Some(token);

        // The record may have been merged since acquisition; fall back to the token
        let id = inner
            .primary_match(identity)
            .filter(|id| inner.records.get(id).is_some_and(holds))
            .or_else(|| inner.records.values().find(|r| holds(r)).map(|r| r.id));

        let Some(record) = id.and_then(|id| inner.records.get_mut(&id)) else {
            warn!(
                "Ignoring stale command completion for {} (token {:?})",
                identity, token
            );
            return false;
        };

        record.pending_command = None;
        match outcome {
            ReleaseOutcome::Succeeded => record.last_error = None,
            ReleaseOutcome::Failed(err) => record.last_error = Some(err),
            ReleaseOutcome::Abandoned => {}
        }
        inner.version += 1;
        true
    }

    /// Mark records `Stale` whose discovery refresh is older than the timeout
    ///
    /// A record with an active (not removed) announcement is still being
    /// refreshed and never goes stale.
    pub fn mark_stale(&self, now: Instant, stale_timeout: Duration) -> usize {
        let mut inner = self.lock();
        let mut marked = 0;

        for record in inner.records.values_mut() {
            if record.discovery_state != DiscoveryState::Advertising
                || !record.active_services.is_empty()
            {
                continue;
            }
            let last = record.last_discovery.unwrap_or(record.last_seen);
            if now.saturating_duration_since(last) >= stale_timeout {
                record.discovery_state = DiscoveryState::Stale;
                record.stale_since = Some(now);
                marked += 1;
                debug!("Registry: {} is stale", record.identity);
            }
        }

        if marked > 0 {
            inner.version += 1;
        }
        marked
    }

    /// Remove records neither advertising nor known to the bridge
    ///
    /// Evicted when the bridge state is `Offline`/`Unknown`, no command is
    /// pending, and the record has been `Stale` (or never announced and not
    /// observed) for at least the eviction window.
    pub fn evict_stale(&self, now: Instant, eviction_window: Duration) -> Vec<DeviceRecord> {
        let mut inner = self.lock();

        let evictable: Vec<DeviceId> = inner
            .records
            .values()
            .filter(|r| is_evictable(r, now, eviction_window))
            .map(|r| r.id)
            .collect();

        let evicted: Vec<DeviceRecord> = evictable
            .iter()
            .filter_map(|id| inner.records.remove(id))
            .collect();

        if !evicted.is_empty() {
            inner.version += 1;
            for record in &evicted {
                debug!("Registry: evicted {}", record.identity);
            }
        }
        evicted
    }

    pub fn set_bridge_health(&self, health: BridgeHealth) {
        let mut inner = self.lock();
        if inner.bridge_health != health {
            inner.bridge_health = health;
            inner.version += 1;
        }
    }

    pub fn set_global_error(&self, error: Option<LastError>) {
        let mut inner = self.lock();
        if inner.global_error != error {
            inner.global_error = error;
            inner.version += 1;
        }
    }
}

fn is_evictable(record: &DeviceRecord, now: Instant, window: Duration) -> bool {
    if record.bridge_state.is_live() || record.pending_command.is_some() {
        return false;
    }
    match record.discovery_state {
        DiscoveryState::Stale => record
            .stale_since
            .is_some_and(|since| now.saturating_duration_since(since) >= window),
        DiscoveryState::Unseen => now.saturating_duration_since(record.last_seen) >= window,
        DiscoveryState::Advertising => false,
    }
}

fn apply_update(record: &mut DeviceRecord, update: DeviceUpdate, now: Instant) {
    if let Some(name) = update.name {
        record.name = Some(name);
    }
    if let Some(model) = update.model {
        record.model = Some(model);
    }
    if let Some(api) = update.api_level {
        record.api_level = Some(api);
    }
    if let Some(pairing) = update.pairing_address {
        record.pairing_address = pairing;
    }
    if let Some(transport) = update.transport {
        record.transport = Some(transport);
    }
    if let Some(paired) = update.paired {
        record.paired = paired;
    }
    if let Some(state) = update.bridge_state {
        record.bridge_state = state;
    }
    if let Some(service) = update.remove_service {
        // The announcement was valid until now; the stale timeout starts here
        if record.active_services.remove(&service) {
            record.last_discovery = Some(now);
        }
    }
    if update.clear_services {
        record.active_services.clear();
    }
    if let Some(service) = update.add_service {
        record.active_services.insert(service);
        record.last_discovery = Some(now);
    }
    if let Some(state) = update.discovery_state {
        if state == DiscoveryState::Advertising {
            record.last_discovery = Some(now);
            record.stale_since = None;
        }
        record.discovery_state = state;
    }
    if !update.passive {
        record.last_seen = now;
    }
}

/// Two identities name different devices
///
/// A network serial only names the transport a device was reached through,
/// so two of them (or one against a hardware serial) never prove anything.
fn conflicts(a: &DeviceIdentity, b: &DeviceIdentity) -> bool {
    fn differ(x: &Option<String>, y: &Option<String>) -> bool {
        matches!((x, y), (Some(x), Some(y)) if x != y)
    }
    let hardware = |id: &DeviceIdentity| id.serial.clone().filter(|s| !is_network_serial(s));
    differ(&hardware(a), &hardware(b)) || differ(&a.device_key, &b.device_key)
}

fn holds_lease(record: &DeviceRecord) -> bool {
    record.pending_command.is_some()
}

impl Inner {
    /// Best existing record for an identity, without mutating
    fn primary_match(&self, identity: &DeviceIdentity) -> Option<DeviceId> {
        let by = |pred: &dyn Fn(&DeviceRecord) -> bool| -> Option<DeviceId> {
            self.records
                .values()
                .find(|r| pred(r) && !conflicts(&r.identity, identity))
                .map(|r| r.id)
        };

        identity
            .serial
            .as_ref()
            .and_then(|s| by(&|r: &DeviceRecord| r.identity.serial.as_ref() == Some(s)))
            .or_else(|| {
                identity
                    .device_key
                    .as_ref()
                    .and_then(|k| by(&|r: &DeviceRecord| r.identity.device_key.as_ref() == Some(k)))
            })
            .or_else(|| {
                identity
                    .address
                    .as_ref()
                    .and_then(|a| by(&|r: &DeviceRecord| r.identity.address.as_ref() == Some(a)))
            })
    }

    /// Resolve the primary record and fold every compatible overlapping
    /// record into it
    ///
    /// Returns the record the update lands on and the part of `identity` it
    /// may claim. Fields still held by a record whose merge was deferred are
    /// left out of the claim.
    fn resolve_and_merge(
        &mut self,
        identity: &DeviceIdentity,
    ) -> Option<(DeviceId, DeviceIdentity)> {
        let Some(primary) = self.primary_match(identity) else {
            self.release_claimed(identity, None);
            return None;
        };
        let mut merged_identity = self.records.get(&primary)?.identity.union(identity);
        let mut deferred: Vec<DeviceId> = Vec::new();

        loop {
            self.release_claimed(&merged_identity, Some(primary));

            let primary_leased = self.records.get(&primary).is_some_and(holds_lease);
            let next = self
                .records
                .values()
                .find(|r| {
                    r.id != primary
                        && !deferred.contains(&r.id)
                        && r.identity.overlaps(&merged_identity)
                        && !conflicts(&r.identity, &merged_identity)
                })
                .map(|r| (r.id, holds_lease(r)));
            let Some((other_id, other_leased)) = next else {
                break;
            };
            if primary_leased && other_leased {
                // Each holder has to see its own release; merge once one lets go
                debug!("Registry: merge into {} deferred, both records leased", primary);
                deferred.push(other_id);
                continue;
            }

            let Some(other) = self.records.remove(&other_id) else {
                break;
            };
            let Some(target) = self.records.remove(&primary) else {
                self.records.insert(other_id, other);
                break;
            };

            let merged = merge_records(target, other);
            merged_identity = merged.identity.union(identity);
            info!("Merged duplicate device records into {}", merged.display_name());
            self.records.insert(primary, merged);
            self.version += 1;
        }

        let mut claim = identity.clone();
        for record in deferred.iter().filter_map(|id| self.records.get(id)) {
            if claim.serial.is_some() && claim.serial == record.identity.serial {
                claim.serial = None;
            }
            if claim.device_key.is_some() && claim.device_key == record.identity.device_key {
                claim.device_key = None;
            }
            if claim.address.is_some() && claim.address == record.identity.address {
                claim.address = None;
            }
        }
        Some((primary, claim))
    }

    /// Take every field `identity` claims away from records of other devices
    fn release_claimed(&mut self, identity: &DeviceIdentity, keep: Option<DeviceId>) {
        let mut released = 0;
        for record in self.records.values_mut() {
            if Some(record.id) == keep || !conflicts(&record.identity, identity) {
                continue;
            }
            if identity.address.is_some() && record.identity.address == identity.address {
                if let Some(address) = record.identity.address.take() {
                    info!("Address {} moved away from {}", address, record.display_name());
                    released += 1;
                }
            }
            if identity.serial.is_some() && record.identity.serial == identity.serial {
                if let Some(serial) = record.identity.serial.take() {
                    info!("Serial {} moved away from {}", serial, record.display_name());
                    released += 1;
                }
            }
            if identity.device_key.is_some() && record.identity.device_key == identity.device_key {
                record.identity.device_key = None;
                released += 1;
            }
        }
        self.version += released;
    }
}

/// Union two records of the same device
///
/// Per field the most recently observed known value wins. The primary's id
/// is kept.
fn merge_records(primary: DeviceRecord, other: DeviceRecord) -> DeviceRecord {
    let primary_id = primary.id;
    let (older, newer) = if other.last_seen > primary.last_seen {
        (primary, other)
    } else {
        (other, primary)
    };

    let bridge_state = if newer.bridge_state != BridgeState::Unknown {
        newer.bridge_state
    } else {
        older.bridge_state
    };
    let discovery_state = if newer.discovery_state != DiscoveryState::Unseen {
        newer.discovery_state
    } else {
        older.discovery_state
    };
    let last_error = match (newer.last_error, older.last_error) {
        (Some(a), Some(b)) => Some(if a.at >= b.at { a } else { b }),
        (a, b) => a.or(b),
    };
    let mut active_services = older.active_services;
    active_services.extend(newer.active_services);

    DeviceRecord {
        id: primary_id,
        identity: older.identity.union(&newer.identity),
        name: pick(newer.name, older.name),
        model: pick(newer.model, older.model),
        api_level: pick(newer.api_level, older.api_level),
        pairing_address: pick(newer.pairing_address, older.pairing_address),
        transport: pick(newer.transport, older.transport),
        paired: newer.paired || older.paired,
        discovery_state,
        bridge_state,
        last_seen: newer.last_seen,
        last_discovery: newer.last_discovery.max(older.last_discovery),
        stale_since: if discovery_state == DiscoveryState::Stale {
            pick(newer.stale_since, older.stale_since)
        } else {
            None
        },
        active_services,
        pending_command: pick(newer.pending_command, older.pending_command),
        last_error,
    }
}

/// Newer known value, else the older one
fn pick<T>(newer: Option<T>, older: Option<T>) -> Option<T> {
    newer.or(older)
}
