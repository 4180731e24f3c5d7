//! Headless mode - NDJSON output instead of the TUI
//!
//! Each line on stdout is one event:
//!
//! ```json
//! {"event":"devices","devices":[{"id":1,"name":"Pixel 7",...}],"timestamp":1704700001000}
//! {"event":"bridge_health","health":{"state":"available"},"timestamp":1704700001000}
//! {"event":"log","level":"info","message":"connect 10.0.0.2:5555: ok","timestamp":1704700002000}
//! ```

pub mod runner;

use std::io::{self, Write};

use adbui_app::LogLevel;
use adbui_core::{BridgeHealth, DeviceView};
use chrono::Utc;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Full ordered device list after a registry change
    Devices {
        devices: Vec<DeviceView>,
        timestamp: i64,
    },

    BridgeHealth {
        health: BridgeHealth,
        timestamp: i64,
    },

    /// Command outcome or device appear/disappear notice
    Log {
        level: &'static str,
        message: String,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    pub fn devices(devices: Vec<DeviceView>) -> Self {
        Self::Devices {
            devices,
            timestamp: Self::now(),
        }
    }

    pub fn bridge_health(health: BridgeHealth) -> Self {
        Self::BridgeHealth {
            health,
            timestamp: Self::now(),
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        let level = match level {
            LogLevel::Info => "info",
            LogLevel::Warn => "warning",
            LogLevel::Error => "error",
        };
        Self::Log {
            level,
            message: message.into(),
            timestamp: Self::now(),
        }
    }

    /// Write this event to stdout as one JSON line
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json).and_then(|_| stdout.flush()) {
            error!("Failed to write headless event: {}", e);
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }
}
