//! adbui-app - Device registry, reconciliation and orchestration for adbui
//!
//! The core of the application lives here:
//! - [`DeviceRegistry`] - the single guarded map of merged device state
//! - [`reconcile`] - the Reconciliation Engine, sole consumer of both feeds
//! - [`DiscoveryListener`] - mDNS subscription with resubscribe backoff
//! - [`BridgeStatusPoller`] - periodic `adb devices -l`
//! - [`CommandDispatcher`] - serialized pair/connect/disconnect/restart
//! - [`Engine`] - task wiring and shutdown, shared by the TUI and headless runners
//!
//! It also carries the TEA (The Elm Architecture) state, messages and update
//! function consumed by `adbui-tui`, plus configuration loading.

pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod input_key;
pub mod message;
pub mod poller;
pub mod reconcile;
pub mod registry;
pub mod signals;
pub mod state;

pub use config::Settings;
pub use discovery::{Backoff, DiscoveryListener};
pub use dispatcher::{Command, CommandDispatcher, CommandSubmitter, CommandTimeouts};
pub use engine::{Engine, EngineConfig};
pub use handler::{UpdateAction, UpdateResult};
pub use input_key::InputKey;
pub use message::Message;
pub use poller::{BridgeStatusPoller, PollTrigger};
pub use reconcile::{CommandEffect, Reconciler};
pub use registry::{DeviceRegistry, DeviceUpdate, EvictionPolicy, ReleaseOutcome};
pub use state::{AppPhase, AppState, LogLevel, LogLine, UiMode};

// Re-export daemon types for the binary and TUI
pub use adbui_daemon::{AdbClient, MdnsBrowser, ToolAvailability};
