//! Events flowing from the discovery and bridge sources into reconciliation

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{BridgeState, DeviceIdentity, NetworkAddress, ServiceKind, Transport};

/// Hardware key embedded in wireless-debugging instance names: `adb-<key>-<suffix>`
static INSTANCE_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^adb-([^-]+)-").expect("invalid instance key regex"));

/// Extract the device key from an mDNS instance name
pub fn device_key_from_instance(instance: &str) -> Option<String> {
    INSTANCE_KEY_REGEX
        .captures(instance)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Serial adb gives a network transport: `host:port` or an mDNS instance
///
/// Unlike a USB serial it names the connection, not the hardware.
pub fn is_network_serial(serial: &str) -> bool {
    serial.parse::<NetworkAddress>().is_ok() || serial.contains(MDNS_CONNECT_MARKER)
}

const MDNS_CONNECT_MARKER: &str = "._adb-tls-connect.";

/// One resolved mDNS service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAnnouncement {
    /// Instance name, unique per service type
    pub name: String,
    pub service: ServiceKind,
    pub address: NetworkAddress,
    /// TXT `name`
    pub device_name: Option<String>,
    /// TXT `api`
    pub api_level: Option<u32>,
    pub device_key: Option<String>,
}

impl ServiceAnnouncement {
    pub fn new(name: impl Into<String>, service: ServiceKind, address: NetworkAddress) -> Self {
        let name = name.into();
        let device_key = device_key_from_instance(&name);
        Self {
            name,
            service,
            address,
            device_name: None,
            api_level: None,
            device_key,
        }
    }

    pub fn with_device_name(mut self, device_name: Option<String>) -> Self {
        self.device_name = device_name;
        self
    }

    pub fn with_api_level(mut self, api_level: Option<u32>) -> Self {
        self.api_level = api_level;
        self
    }

    /// Identity this announcement resolves to.
    ///
    /// Pairing endpoints are ephemeral and never become the device address.
    pub fn identity(&self) -> DeviceIdentity {
        let identity = DeviceIdentity::default().with_device_key(self.device_key.clone());
        match self.service {
            ServiceKind::Connect => identity.with_address(Some(self.address.clone())),
            ServiceKind::Pairing if identity.is_empty() => {
                identity.with_address(Some(self.address.clone()))
            }
            ServiceKind::Pairing => identity,
        }
    }
}

/// Discovery-side events, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// First resolution of an instance
    Announced(ServiceAnnouncement),
    /// Re-resolution of a known instance (refresh, TXT or address change)
    Updated(ServiceAnnouncement),
    Removed { name: String, service: ServiceKind },
    /// The browse stream ended; the listener is resubscribing
    SubscriptionLost { reason: String },
}

/// One row of `adb devices -l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeDevice {
    pub serial: String,
    pub state: BridgeState,
    pub transport: Transport,
    pub model: Option<String>,
    pub product: Option<String>,
    pub transport_id: Option<u32>,
    /// Parsed from a `host:port` serial
    pub address: Option<NetworkAddress>,
    /// `<key>` of an `adb-<key>-<suffix>._adb-tls-connect._tcp` serial; USB
    /// serials are their own key
    pub device_key: Option<String>,
}

impl BridgeDevice {
    /// Build a device from a serial, inferring transport and address
    pub fn new(serial: impl Into<String>, state: BridgeState) -> Self {
        let serial = serial.into();
        let address = serial.parse::<NetworkAddress>().ok();
        let transport = if address.is_some() {
            Transport::Tcp
        } else if serial.contains(MDNS_CONNECT_MARKER) {
            Transport::Mdns
        } else {
            Transport::Usb
        };
        let device_key = match transport {
            Transport::Tcp => None,
            Transport::Mdns => device_key_from_instance(&serial),
            Transport::Usb => Some(serial.clone()),
        };
        Self {
            serial,
            state,
            transport,
            model: None,
            product: None,
            transport_id: None,
            address,
            device_key,
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::from_serial(self.serial.clone())
            .with_address(self.address.clone())
            .with_device_key(self.device_key.clone())
    }
}

/// Bridge-side events produced by the status poller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The full device list as of one successful poll
    Snapshot(Vec<BridgeDevice>),
    /// A poll failed or timed out
    Unavailable { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_from_instance() {
        assert_eq!(
            device_key_from_instance("adb-R5CT1234ABC-xYz12a"),
            Some("R5CT1234ABC".to_string())
        );
        assert_eq!(
            device_key_from_instance("adb-R5CT1234ABC-xYz12a._adb-tls-connect._tcp"),
            Some("R5CT1234ABC".to_string())
        );
        assert_eq!(device_key_from_instance("studio-xyz"), None);
        assert_eq!(device_key_from_instance("adb-nodash"), None);
    }

    #[test]
    fn test_network_serials() {
        assert!(is_network_serial("10.0.0.2:5555"));
        assert!(is_network_serial("[fe80::1]:37000"));
        assert!(is_network_serial("adb-ABC123-xyz._adb-tls-connect._tcp"));
        assert!(!is_network_serial("R58M123ABC"));
        assert!(!is_network_serial("emulator-5554"));
    }

    #[test]
    fn test_pairing_announcement_identity_omits_ephemeral_port() {
        let ann = ServiceAnnouncement::new(
            "adb-ABC123-pair",
            ServiceKind::Pairing,
            NetworkAddress::new("10.0.0.2", 41234),
        );
        let identity = ann.identity();
        assert_eq!(identity.device_key.as_deref(), Some("ABC123"));
        assert!(identity.address.is_none());
    }

    #[test]
    fn test_connect_announcement_identity_includes_address() {
        let ann = ServiceAnnouncement::new(
            "adb-ABC123-conn",
            ServiceKind::Connect,
            NetworkAddress::new("10.0.0.2", 37000),
        );
        let identity = ann.identity();
        assert_eq!(identity.address, Some(NetworkAddress::new("10.0.0.2", 37000)));
        assert_eq!(identity.device_key.as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_bridge_device_transport_inference() {
        let tcp = BridgeDevice::new("10.0.0.2:5555", BridgeState::Connected);
        assert_eq!(tcp.transport, Transport::Tcp);
        assert_eq!(tcp.address, Some(NetworkAddress::new("10.0.0.2", 5555)));

        let mdns = BridgeDevice::new(
            "adb-ABC123-xyz._adb-tls-connect._tcp",
            BridgeState::Connected,
        );
        assert_eq!(mdns.transport, Transport::Mdns);
        assert_eq!(mdns.device_key.as_deref(), Some("ABC123"));

        let usb = BridgeDevice::new("emulator-5554", BridgeState::Offline);
        assert_eq!(usb.transport, Transport::Usb);
        assert!(usb.address.is_none());
        assert_eq!(usb.device_key.as_deref(), Some("emulator-5554"));
    }
}
