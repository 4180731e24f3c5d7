//! mDNS browsing for Android wireless-debugging services
//!
//! Browses `_adb-tls-connect._tcp.local.` and `_adb-tls-pairing._tcp.local.`
//! and forwards resolved/removed instances as [`RawServiceEvent`]s. The
//! receiver returned by [`DiscoverySource::subscribe`] closing means the
//! subscription was lost; callers resubscribe.

use std::net::IpAddr;

use adbui_core::prelude::*;
use adbui_core::{NetworkAddress, ServiceAnnouncement, ServiceKind};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;

/// Buffer for raw discovery events between the browse tasks and the listener
const EVENT_BUFFER: usize = 64;

/// Un-deduplicated discovery event as reported by the mDNS library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawServiceEvent {
    Resolved(ServiceAnnouncement),
    Removed { name: String, service: ServiceKind },
}

/// A source of service announcements
#[trait_variant::make(DiscoverySource: Send)]
pub trait LocalDiscoverySource {
    /// Start browsing the given service kinds
    async fn subscribe(&self, kinds: &[ServiceKind]) -> Result<mpsc::Receiver<RawServiceEvent>>;
}

/// Discovery backed by the `mdns-sd` daemon
#[derive(Debug, Default, Clone)]
pub struct MdnsBrowser;

impl MdnsBrowser {
    pub fn new() -> Self {
        Self
    }
}

impl DiscoverySource for MdnsBrowser {
    async fn subscribe(&self, kinds: &[ServiceKind]) -> Result<mpsc::Receiver<RawServiceEvent>> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::discovery(format!("failed to create mDNS daemon: {e}")))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut tasks = Vec::with_capacity(kinds.len());

        for kind in kinds.iter().copied() {
            let browse = match daemon.browse(kind.service_type()) {
                Ok(browse) => browse,
                Err(e) => {
                    let _ = daemon.shutdown();
                    return Err(Error::discovery(format!(
                        "failed to browse {}: {e}",
                        kind.service_type()
                    )));
                }
            };

            let tx = tx.clone();
            let daemon = daemon.clone();
            tasks.push(tokio::spawn(async move {
                info!(service_type = kind.service_type(), "mDNS browse started");

                loop {
                    tokio::select! {
                        event = browse.recv_async() => {
                            let Ok(event) = event else { break };
                            let Some(raw) = convert_event(kind, event) else {
                                continue;
                            };
                            if tx.send(raw).await.is_err() {
                                break;
                            }
                        }
                        // Listener dropped the subscription
                        _ = tx.closed() => break,
                    }
                }

                if let Err(e) = daemon.stop_browse(kind.service_type()) {
                    debug!("mDNS stop_browse({}) failed: {}", kind.service_type(), e);
                }
                warn!(service_type = kind.service_type(), "mDNS browse ended");
            }));
        }

        // Only the browse tasks hold senders: once they all end the receiver closes
        drop(tx);
        tokio::spawn(async move {
            for task in tasks {
                let _ = task.await;
            }
            if let Err(e) = daemon.shutdown() {
                debug!("mDNS daemon shutdown failed: {}", e);
            }
        });

        Ok(rx)
    }
}

fn convert_event(kind: ServiceKind, event: ServiceEvent) -> Option<RawServiceEvent> {
    match event {
        ServiceEvent::ServiceResolved(info) => match announcement_from_info(kind, &info) {
            Some(ann) => {
                debug!(
                    "mDNS resolved {} {} at {}",
                    kind.short_name(),
                    ann.name,
                    ann.address
                );
                Some(RawServiceEvent::Resolved(ann))
            }
            None => {
                debug!(
                    "mDNS instance {} has no usable address, ignoring",
                    info.get_fullname()
                );
                None
            }
        },
        ServiceEvent::ServiceRemoved(service_type, fullname) => {
            debug!("mDNS removed {}", fullname);
            Some(RawServiceEvent::Removed {
                name: instance_name(&fullname, &service_type),
                service: kind,
            })
        }
        _ => None,
    }
}

/// Build an announcement from a resolved service
pub fn announcement_from_info(kind: ServiceKind, info: &ServiceInfo) -> Option<ServiceAnnouncement> {
    let host = pick_host(info.get_addresses().iter().copied())?;
    let name = instance_name(info.get_fullname(), kind.service_type());

    let device_name = info
        .get_property_val_str("name")
        .map(str::to_string)
        .filter(|n| !n.is_empty());
    let api_level = info
        .get_property_val_str("api")
        .and_then(|a| a.trim().parse().ok());

    Some(
        ServiceAnnouncement::new(name, kind, NetworkAddress::new(host, info.get_port()))
            .with_device_name(device_name)
            .with_api_level(api_level),
    )
}

/// Strip `.<service type>` from a full instance name
pub fn instance_name(fullname: &str, service_type: &str) -> String {
    let ty = service_type.trim_end_matches('.');
    let full = fullname.trim_end_matches('.');
    full.strip_suffix(ty)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(full)
        .to_string()
}

/// Prefer a routable IPv4 address, then a non-link-local IPv6 address
pub fn pick_host(addresses: impl IntoIterator<Item = IpAddr>) -> Option<String> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for addr in addresses {
        match addr {
            IpAddr::V4(a) if !a.is_link_local() && !a.is_unspecified() => v4.push(a),
            IpAddr::V6(a) if !is_v6_link_local(&a) && !a.is_unspecified() => v6.push(a),
            _ => {}
        }
    }
    v4.sort();
    v6.sort();

    v4.first()
        .map(ToString::to_string)
        .or_else(|| v6.first().map(ToString::to_string))
}

fn is_v6_link_local(addr: &std::net::Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name_strips_service_type() {
        assert_eq!(
            instance_name(
                "adb-R5CT1234ABC-xYz12a._adb-tls-connect._tcp.local.",
                "_adb-tls-connect._tcp.local."
            ),
            "adb-R5CT1234ABC-xYz12a"
        );
        assert_eq!(
            instance_name("plain-name", "_adb-tls-connect._tcp.local."),
            "plain-name"
        );
    }

    #[test]
    fn test_pick_host_prefers_ipv4() {
        let addrs: Vec<IpAddr> = vec![
            "fd00::5".parse().unwrap(),
            "192.168.1.5".parse().unwrap(),
        ];
        assert_eq!(pick_host(addrs).as_deref(), Some("192.168.1.5"));
    }

    #[test]
    fn test_pick_host_skips_link_local() {
        let addrs: Vec<IpAddr> = vec![
            "169.254.10.1".parse().unwrap(),
            "fe80::1".parse().unwrap(),
            "fd00::5".parse().unwrap(),
        ];
        assert_eq!(pick_host(addrs).as_deref(), Some("fd00::5"));

        let only_link_local: Vec<IpAddr> = vec!["fe80::1".parse().unwrap()];
        assert_eq!(pick_host(only_link_local), None);
    }

    #[test]
    fn test_announcement_from_info() {
        let info = ServiceInfo::new(
            "_adb-tls-connect._tcp.local.",
            "adb-R5CT1234ABC-xYz12a",
            "android.local.",
            "192.168.1.5",
            37123,
            &[("name", "Pixel 7"), ("api", "34")][..],
        )
        .unwrap();

        let ann = announcement_from_info(ServiceKind::Connect, &info).unwrap();
        assert_eq!(ann.name, "adb-R5CT1234ABC-xYz12a");
        assert_eq!(ann.address, NetworkAddress::new("192.168.1.5", 37123));
        assert_eq!(ann.device_name.as_deref(), Some("Pixel 7"));
        assert_eq!(ann.api_level, Some(34));
        assert_eq!(ann.device_key.as_deref(), Some("R5CT1234ABC"));
    }

    #[test]
    fn test_removed_event_conversion() {
        let event = ServiceEvent::ServiceRemoved(
            "_adb-tls-pairing._tcp.local.".to_string(),
            "adb-ABC-pair._adb-tls-pairing._tcp.local.".to_string(),
        );
        assert_eq!(
            convert_event(ServiceKind::Pairing, event),
            Some(RawServiceEvent::Removed {
                name: "adb-ABC-pair".to_string(),
                service: ServiceKind::Pairing,
            })
        );
    }
}
