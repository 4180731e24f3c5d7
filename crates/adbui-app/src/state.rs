//! Application state (Model in TEA pattern)

use std::collections::VecDeque;

use adbui_core::{BridgeHealth, DeviceId, DeviceIdentity, DeviceRecord, LastError};
use chrono::{DateTime, Local};

use crate::config::Settings;

/// Current UI mode/screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Device table
    #[default]
    Normal,
    /// Free-form `host:port` entry
    ConnectDialog,
    /// Six-digit pairing code entry for [`AppState::dialog_target`]
    PairDialog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppPhase {
    #[default]
    Running,
    Quitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One entry in the log pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

/// Complete application state (the Model in TEA)
#[derive(Debug)]
pub struct AppState {
    pub phase: AppPhase,
    pub ui_mode: UiMode,

    /// Latest registry snapshot, in registry order
    pub devices: Vec<DeviceRecord>,
    /// Index into `devices`
    pub selected: Option<usize>,

    pub dialog_input: String,
    pub dialog_target: Option<DeviceIdentity>,
    pub dialog_error: Option<String>,

    pub logs: VecDeque<LogLine>,
    pub max_log_lines: usize,
    pub show_logs: bool,

    pub bridge_health: BridgeHealth,
    pub global_error: Option<LastError>,

    /// `adb version` first line, shown in the header
    pub adb_version: Option<String>,
    pub mdns_enabled: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_settings(&Settings::default())
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &Settings) -> Self {
        Self {
            phase: AppPhase::Running,
            ui_mode: UiMode::Normal,
            devices: Vec::new(),
            selected: None,
            dialog_input: String::new(),
            dialog_target: None,
            dialog_error: None,
            logs: VecDeque::new(),
            max_log_lines: settings.ui.max_log_lines.max(1),
            show_logs: settings.ui.show_logs,
            bridge_health: BridgeHealth::default(),
            global_error: None,
            adb_version: None,
            mdns_enabled: settings.discovery.enabled,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.phase == AppPhase::Quitting
    }

    pub fn selected_device(&self) -> Option<&DeviceRecord> {
        self.selected.and_then(|i| self.devices.get(i))
    }

    /// Replace the device list, keeping the selection on the same device
    pub fn set_devices(&mut self, devices: Vec<DeviceRecord>) {
        let selected_id: Option<DeviceId> = self.selected_device().map(|d| d.id);
        self.devices = devices;

        self.selected = match selected_id {
            Some(id) => self
                .devices
                .iter()
                .position(|d| d.id == id)
                .or_else(|| self.selected.map(|i| i.min(self.devices.len().saturating_sub(1)))),
            None => Some(0),
        };
        if self.devices.is_empty() {
            self.selected = None;
        }
    }

    pub fn select_next(&mut self) {
        if self.devices.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(i) => (i + 1) % self.devices.len(),
            None => 0,
        });
    }

    pub fn select_previous(&mut self) {
        if self.devices.is_empty() {
            return;
        }
        let len = self.devices.len();
        self.selected = Some(match self.selected {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        });
    }

    pub fn select_first(&mut self) {
        self.selected = (!self.devices.is_empty()).then_some(0);
    }

    pub fn select_last(&mut self) {
        self.selected = self.devices.len().checked_sub(1);
    }

    pub fn connected_count(&self) -> usize {
        self.devices.iter().filter(|d| d.is_connected()).count()
    }

    // ─────────────────────────────────────────────────────────
    // Dialogs
    // ─────────────────────────────────────────────────────────

    pub fn open_dialog(&mut self, mode: UiMode, target: Option<DeviceIdentity>) {
        self.ui_mode = mode;
        self.dialog_target = target;
        self.dialog_input.clear();
        self.dialog_error = None;
    }

    pub fn close_dialog(&mut self) {
        self.ui_mode = UiMode::Normal;
        self.dialog_target = None;
        self.dialog_input.clear();
        self.dialog_error = None;
    }

    // ─────────────────────────────────────────────────────────
    // Log pane
    // ─────────────────────────────────────────────────────────

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        while self.logs.len() >= self.max_log_lines {
            self.logs.pop_front();
        }
        self.logs.push_back(LogLine {
            at: Local::now(),
            level,
            message: message.into(),
        });
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}
