//! Core domain types: identities, merged device records and their states

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ─────────────────────────────────────────────────────────────────
// Network address
// ─────────────────────────────────────────────────────────────────

/// A `host:port` endpoint as used by `adb connect` / `adb pair`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkAddress {
    /// IP literal or hostname, IPv6 without brackets
    pub host: String,
    pub port: u16,
}

impl NetworkAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NetworkAddress {
    type Err = Error;

    /// Parse `host:port` or `[v6]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_address(s, "missing port"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() {
            return Err(Error::invalid_address(s, "missing host"));
        }
        // An unbracketed IPv6 literal has no unambiguous port separator
        if host.contains(':') && !trimmed.starts_with('[') {
            return Err(Error::invalid_address(s, "IPv6 hosts must be bracketed"));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| Error::invalid_address(s, "port is not a number"))?;
        if port == 0 {
            return Err(Error::invalid_address(s, "port must be non-zero"));
        }

        Ok(Self::new(host, port))
    }
}

// ─────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────

/// Stable key for one physical device across the discovery and bridge namespaces.
///
/// Two identities refer to the same device if any populated field matches.
/// Once a record learns several fields they are kept as a union; resolution
/// prefers the bridge serial, then the mDNS device key, then the address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Connect endpoint (`_adb-tls-connect._tcp` or a manual target)
    pub address: Option<NetworkAddress>,
    /// Bridge-assigned serial
    pub serial: Option<String>,
    /// Hardware key embedded in mDNS instance names (`adb-<key>-<suffix>`)
    pub device_key: Option<String>,
}

impl DeviceIdentity {
    pub fn from_address(address: NetworkAddress) -> Self {
        Self {
            address: Some(address),
            ..Default::default()
        }
    }

    pub fn from_serial(serial: impl Into<String>) -> Self {
        Self {
            serial: Some(serial.into()),
            ..Default::default()
        }
    }

    pub fn from_device_key(key: impl Into<String>) -> Self {
        Self {
            device_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: Option<NetworkAddress>) -> Self {
        if address.is_some() {
            self.address = address;
        }
        self
    }

    pub fn with_serial(mut self, serial: Option<String>) -> Self {
        if serial.is_some() {
            self.serial = serial;
        }
        self
    }

    pub fn with_device_key(mut self, key: Option<String>) -> Self {
        if key.is_some() {
            self.device_key = key;
        }
        self
    }

    /// True when no field is populated
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.serial.is_none() && self.device_key.is_none()
    }

    /// True if any populated field matches the other identity
    pub fn overlaps(&self, other: &DeviceIdentity) -> bool {
        fn same<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            matches!((a, b), (Some(x), Some(y)) if x == y)
        }
        same(&self.serial, &other.serial)
            || same(&self.device_key, &other.device_key)
            || same(&self.address, &other.address)
    }

    /// Union of both identities; populated fields of `newer` win
    pub fn union(&self, newer: &DeviceIdentity) -> DeviceIdentity {
        DeviceIdentity {
            address: newer.address.clone().or_else(|| self.address.clone()),
            serial: newer.serial.clone().or_else(|| self.serial.clone()),
            device_key: newer.device_key.clone().or_else(|| self.device_key.clone()),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.serial, &self.address, &self.device_key) {
            (Some(serial), _, _) => write!(f, "{}", serial),
            (None, Some(address), _) => write!(f, "{}", address),
            (None, None, Some(key)) => write!(f, "{}", key),
            (None, None, None) => write!(f, "<unidentified>"),
        }
    }
}

/// Registry-internal handle; survives identity merges (the older id wins)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────
// Per-source states
// ─────────────────────────────────────────────────────────────────

/// Discovery-side lifecycle of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    /// Never announced over mDNS
    #[default]
    Unseen,
    /// Announced and refreshed within the stale timeout
    Advertising,
    /// No refresh within the stale timeout
    Stale,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Unseen => write!(f, "unseen"),
            DiscoveryState::Advertising => write!(f, "advertising"),
            DiscoveryState::Stale => write!(f, "stale"),
        }
    }
}

/// Bridge-side connection state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    #[default]
    Unknown,
    Unauthorized,
    Offline,
    Connecting,
    Connected,
}

impl BridgeState {
    /// Map the state column of `adb devices -l`
    pub fn from_adb(state: &str) -> Self {
        match state.trim() {
            "device" => BridgeState::Connected,
            "offline" => BridgeState::Offline,
            "unauthorized" | "no permissions" | "no" => BridgeState::Unauthorized,
            "authorizing" | "connecting" => BridgeState::Connecting,
            _ => BridgeState::Unknown,
        }
    }

    /// States that count as "known to the bridge" for eviction purposes
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            BridgeState::Unauthorized | BridgeState::Connecting | BridgeState::Connected
        )
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Unknown => write!(f, "unknown"),
            BridgeState::Unauthorized => write!(f, "unauthorized"),
            BridgeState::Offline => write!(f, "offline"),
            BridgeState::Connecting => write!(f, "connecting"),
            BridgeState::Connected => write!(f, "connected"),
        }
    }
}

/// How the bridge reaches a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Usb,
    /// `adb connect host:port`
    Tcp,
    /// Auto-connected through `_adb-tls-connect._tcp`
    Mdns,
}

/// The two mDNS service types advertised by Android wireless debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Connect,
    Pairing,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Connect, ServiceKind::Pairing];

    pub fn service_type(&self) -> &'static str {
        match self {
            ServiceKind::Connect => "_adb-tls-connect._tcp.local.",
            ServiceKind::Pairing => "_adb-tls-pairing._tcp.local.",
        }
    }

    pub fn from_service_type(service_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.service_type().trim_end_matches('.') == service_type.trim_end_matches('.'))
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            ServiceKind::Connect => "connect",
            ServiceKind::Pairing => "pairing",
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Commands and errors
// ─────────────────────────────────────────────────────────────────

/// Ownership token for a device's in-flight command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CommandToken(pub u64);

/// Per-device operations serialized by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Pair,
    Connect,
    Disconnect,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Pair => write!(f, "pair"),
            CommandKind::Connect => write!(f, "connect"),
            CommandKind::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// An operation currently holding a device
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub token: CommandToken,
    pub kind: CommandKind,
    pub started_at: Instant,
}

/// User-facing failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Busy,
    ServerRestarting,
    Timeout,
    NetworkError,
    AuthError,
    NotFound,
    DiscoverySubscriptionLost,
    BridgeUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Busy => "busy",
            ErrorKind::ServerRestarting => "server restarting",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network error",
            ErrorKind::AuthError => "auth error",
            ErrorKind::NotFound => "not found",
            ErrorKind::DiscoverySubscriptionLost => "discovery lost",
            ErrorKind::BridgeUnavailable => "adb unavailable",
        };
        write!(f, "{}", label)
    }
}

/// The most recent failed operation on a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Local>,
}

impl LastError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            at: Local::now(),
        }
    }

    /// Build from an [`Error`], falling back to `BridgeUnavailable` for
    /// infrastructure failures
    pub fn from_error(err: &Error) -> Self {
        Self::new(
            err.kind().unwrap_or(ErrorKind::BridgeUnavailable),
            err.to_string(),
        )
    }
}

/// Registry-wide view of the bridge daemon's reachability
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BridgeHealth {
    /// No poll has completed yet
    #[default]
    Starting,
    Available,
    /// Some polls failed but fewer than the threshold
    Degraded { failures: u32 },
    Unavailable { reason: String },
}

// ─────────────────────────────────────────────────────────────────
// Device record
// ─────────────────────────────────────────────────────────────────

/// Mutually exclusive status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Advertising the pairing service; needs a code
    Pairing,
    Connected,
    Connecting,
    Unauthorized,
    Offline,
    /// Advertising the connect service but not connected
    Disconnected,
    Unknown,
}

impl DeviceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DeviceStatus::Pairing => "Enter code",
            DeviceStatus::Connected => "Connected",
            DeviceStatus::Connecting => "Connecting",
            DeviceStatus::Unauthorized => "Unauthorized",
            DeviceStatus::Offline => "Offline",
            DeviceStatus::Disconnected => "Disconnected",
            DeviceStatus::Unknown => "Unknown",
        }
    }
}

/// One device's merged state
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub identity: DeviceIdentity,
    /// Name from the mDNS TXT record
    pub name: Option<String>,
    /// `model:` from `adb devices -l`
    pub model: Option<String>,
    pub api_level: Option<u32>,
    /// Endpoint of an active `_adb-tls-pairing._tcp` announcement
    pub pairing_address: Option<NetworkAddress>,
    pub transport: Option<Transport>,
    pub paired: bool,
    pub discovery_state: DiscoveryState,
    pub bridge_state: BridgeState,
    /// Last discovery or bridge observation
    pub last_seen: Instant,
    /// Last discovery refresh; drives the stale timeout
    pub last_discovery: Option<Instant>,
    /// When `discovery_state` became `Stale`
    pub stale_since: Option<Instant>,
    /// mDNS instance names currently announced for this device
    pub active_services: BTreeSet<String>,
    pub pending_command: Option<PendingCommand>,
    pub last_error: Option<LastError>,
}

impl DeviceRecord {
    pub fn new(id: DeviceId, identity: DeviceIdentity, now: Instant) -> Self {
        Self {
            id,
            identity,
            name: None,
            model: None,
            api_level: None,
            pairing_address: None,
            transport: None,
            paired: false,
            discovery_state: DiscoveryState::Unseen,
            bridge_state: BridgeState::Unknown,
            last_seen: now,
            last_discovery: None,
            stale_since: None,
            active_services: BTreeSet::new(),
            pending_command: None,
            last_error: None,
        }
    }

    /// Best human-readable name
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.model.as_ref().map(|m| m.replace('_', " ")))
            .unwrap_or_else(|| self.identity.to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.bridge_state == BridgeState::Connected
    }

    pub fn is_pairing(&self) -> bool {
        self.pairing_address.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.pending_command.is_some()
    }

    /// Derive the single status shown in the device table
    pub fn status(&self) -> DeviceStatus {
        match self.bridge_state {
            BridgeState::Connected => DeviceStatus::Connected,
            _ if self.is_pairing() => DeviceStatus::Pairing,
            BridgeState::Connecting => DeviceStatus::Connecting,
            BridgeState::Unauthorized => DeviceStatus::Unauthorized,
            BridgeState::Offline => DeviceStatus::Offline,
            BridgeState::Unknown
                if self.discovery_state == DiscoveryState::Advertising
                    && self.identity.address.is_some() =>
            {
                DeviceStatus::Disconnected
            }
            BridgeState::Unknown => DeviceStatus::Unknown,
        }
    }

    /// Compare everything except observation timestamps
    pub fn same_state(&self, other: &DeviceRecord) -> bool {
        self.id == other.id
            && self.identity == other.identity
            && self.name == other.name
            && self.model == other.model
            && self.api_level == other.api_level
            && self.pairing_address == other.pairing_address
            && self.transport == other.transport
            && self.paired == other.paired
            && self.discovery_state == other.discovery_state
            && self.bridge_state == other.bridge_state
            && self.stale_since == other.stale_since
            && self.active_services == other.active_services
            && self.pending_command == other.pending_command
            && self.last_error == other.last_error
    }
}

/// Serializable projection of a [`DeviceRecord`] (headless output)
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub id: u64,
    pub name: String,
    pub address: Option<String>,
    pub serial: Option<String>,
    pub device_key: Option<String>,
    pub api_level: Option<u32>,
    pub paired: bool,
    pub pairing_address: Option<String>,
    pub discovery_state: DiscoveryState,
    pub bridge_state: BridgeState,
    pub status: DeviceStatus,
    pub last_seen_secs: u64,
    pub pending_command: Option<CommandKind>,
    pub last_error: Option<LastError>,
}

impl DeviceView {
    pub fn from_record(record: &DeviceRecord, now: Instant) -> Self {
        let age: Duration = now.saturating_duration_since(record.last_seen);
        Self {
            id: record.id.0,
            name: record.display_name(),
            address: record.identity.address.as_ref().map(ToString::to_string),
            serial: record.identity.serial.clone(),
            device_key: record.identity.device_key.clone(),
            api_level: record.api_level,
            paired: record.paired,
            pairing_address: record.pairing_address.as_ref().map(ToString::to_string),
            discovery_state: record.discovery_state,
            bridge_state: record.bridge_state,
            status: record.status(),
            last_seen_secs: age.as_secs(),
            pending_command: record.pending_command.as_ref().map(|p| p.kind),
            last_error: record.last_error.clone(),
        }
    }
}
