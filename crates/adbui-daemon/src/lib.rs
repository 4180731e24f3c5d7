//! # adbui-daemon - Bridge and Discovery Adapters
//!
//! Talks to the outside world: the `adb` executable and the mDNS network.
//! Everything here is stateless apart from the mDNS browse tasks; the merged
//! device state lives in `adbui-app`.
//!
//! Depends on [`adbui_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Bridge
//! - [`BridgeClient`] - Async trait over adb operations (list, pair, connect, ...)
//! - [`AdbClient`] - Production implementation spawning `adb` subprocesses
//! - [`parse_devices_output()`] - Parse `adb devices -l`
//!
//! ### Discovery
//! - [`DiscoverySource`] - Async trait returning a stream of raw service events
//! - [`MdnsBrowser`] - Production implementation over `mdns-sd`
//!
//! ### Platform Utilities
//! - [`ToolAvailability`] - Locate the adb executable at startup

pub mod adb;
pub mod devices;
pub mod mdns;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tool_availability;

pub use adb::{
    classify_connect_output, classify_disconnect_output, classify_pair_output, AdbClient,
    AdbOutput, BridgeClient, LocalBridgeClient,
};
pub use devices::parse_devices_output;
pub use mdns::{DiscoverySource, LocalDiscoverySource, MdnsBrowser, RawServiceEvent};
pub use tool_availability::ToolAvailability;
