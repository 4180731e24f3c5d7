//! Configuration types for adbui
//!
//! All durations are stored as milliseconds in the file and converted to
//! [`Duration`] for the engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::Backoff;
use crate::dispatcher::CommandTimeouts;
use crate::registry::EvictionPolicy;

/// Application settings (`config.toml`)
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub ui: UiSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BridgeSettings {
    /// Explicit adb executable; searched on PATH and the Android SDK otherwise
    #[serde(default)]
    pub adb_path: Option<PathBuf>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for one `adb devices -l`
    #[serde(default = "default_list_timeout_ms")]
    pub list_timeout_ms: u64,

    /// Consecutive failed polls before the server is reported unavailable
    #[serde(default = "default_unavailable_threshold")]
    pub unavailable_threshold: u32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            adb_path: None,
            poll_interval_ms: default_poll_interval_ms(),
            list_timeout_ms: default_list_timeout_ms(),
            unavailable_threshold: default_unavailable_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DiscoverySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,

    #[serde(default = "default_eviction_window_ms")]
    pub eviction_window_ms: u64,

    #[serde(default = "default_eviction_check_ms")]
    pub eviction_check_ms: u64,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_timeout_ms: default_stale_timeout_ms(),
            eviction_window_ms: default_eviction_window_ms(),
            eviction_check_ms: default_eviction_check_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TimeoutSettings {
    #[serde(default = "default_pair_ms")]
    pub pair_ms: u64,

    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    #[serde(default = "default_disconnect_ms")]
    pub disconnect_ms: u64,

    #[serde(default = "default_restart_ms")]
    pub restart_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            pair_ms: default_pair_ms(),
            connect_ms: default_connect_ms(),
            disconnect_ms: default_disconnect_ms(),
            restart_ms: default_restart_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UiSettings {
    #[serde(default)]
    pub show_logs: bool,

    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            show_logs: false,
            max_log_lines: default_max_log_lines(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_list_timeout_ms() -> u64 {
    5000
}

fn default_unavailable_threshold() -> u32 {
    3
}

fn default_stale_timeout_ms() -> u64 {
    30_000
}

fn default_eviction_window_ms() -> u64 {
    60_000
}

fn default_eviction_check_ms() -> u64 {
    10_000
}

fn default_backoff_initial_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_pair_ms() -> u64 {
    10_000
}

fn default_connect_ms() -> u64 {
    10_000
}

fn default_disconnect_ms() -> u64 {
    5000
}

fn default_restart_ms() -> u64 {
    5000
}

fn default_max_log_lines() -> usize {
    500
}

// Zero would spin the interval timers
fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        millis(self.bridge.poll_interval_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        millis(self.bridge.list_timeout_ms)
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            stale_timeout: millis(self.discovery.stale_timeout_ms),
            eviction_window: millis(self.discovery.eviction_window_ms),
            check_interval: millis(self.discovery.eviction_check_ms),
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            millis(self.discovery.backoff_initial_ms),
            millis(self.discovery.backoff_max_ms),
        )
    }

    pub fn command_timeouts(&self) -> CommandTimeouts {
        CommandTimeouts {
            pair: millis(self.timeouts.pair_ms),
            connect: millis(self.timeouts.connect_ms),
            disconnect: millis(self.timeouts.disconnect_ms),
            restart: millis(self.timeouts.restart_ms),
        }
    }
}
