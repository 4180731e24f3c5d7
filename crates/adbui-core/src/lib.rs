//! # adbui-core - Core Domain Types
//!
//! Foundation crate for adbui. Provides the device identity model, merged
//! device records, the events exchanged between the discovery/bridge feeds and
//! the reconciliation engine, error handling, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`DeviceIdentity`] - Cross-namespace device key (address / serial / device key)
//! - [`DeviceRecord`] - One device's merged discovery + bridge state
//! - [`DiscoveryState`], [`BridgeState`] - The two per-source state machines
//! - [`ErrorKind`], [`LastError`] - Command failure classification
//!
//! ### Events (`events`)
//! - [`DiscoveryEvent`] - Announced / Updated / Removed service announcements
//! - [`BridgeEvent`] - Bridge snapshot or unavailability
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! ```rust
//! use adbui_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all adbui crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{Error, Result, ResultExt};
pub use events::{
    device_key_from_instance, is_network_serial, BridgeDevice, BridgeEvent, DiscoveryEvent,
    ServiceAnnouncement,
};
pub use types::{
    BridgeHealth, BridgeState, CommandKind, CommandToken, DeviceId, DeviceIdentity, DeviceRecord,
    DeviceStatus, DeviceView, DiscoveryState, ErrorKind, LastError, NetworkAddress,
    PendingCommand, ServiceKind, Transport,
};
