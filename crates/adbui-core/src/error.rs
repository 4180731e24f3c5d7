//! Application error types with rich context

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ErrorKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Terminal/TUI Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Terminal error: {message}")]
    Terminal { message: String },

    // ─────────────────────────────────────────────────────────────
    // Bridge (adb) Errors
    // ─────────────────────────────────────────────────────────────
    #[error("adb not found. Install Android platform-tools or pass --adb <path>.")]
    BridgeNotFound,

    #[error("adb server unavailable: {message}")]
    BridgeUnavailable { message: String },

    #[error("adb {operation} timed out after {}s", after.as_secs_f32())]
    Timeout { operation: String, after: Duration },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Unexpected adb output: {message}")]
    Protocol { message: String },

    // ─────────────────────────────────────────────────────────────
    // Command Dispatch Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Another operation is already running on {device}")]
    Busy { device: String },

    #[error("adb server restart in progress")]
    ServerRestarting,

    // ─────────────────────────────────────────────────────────────
    // Discovery Errors
    // ─────────────────────────────────────────────────────────────
    #[error("mDNS subscription lost: {message}")]
    DiscoverySubscriptionLost { message: String },

    #[error("Discovery error: {message}")]
    Discovery { message: String },

    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Configuration file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    pub fn bridge_unavailable(message: impl Into<String>) -> Self {
        Self::BridgeUnavailable {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn busy(device: impl Into<String>) -> Self {
        Self::Busy {
            device: device.into(),
        }
    }

    pub fn subscription_lost(message: impl Into<String>) -> Self {
        Self::DiscoverySubscriptionLost {
            message: message.into(),
        }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Map this error onto the user-facing command error kinds.
    ///
    /// Returns `None` for infrastructure errors that never reach a device record.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Busy { .. } => Some(ErrorKind::Busy),
            Error::ServerRestarting => Some(ErrorKind::ServerRestarting),
            Error::Timeout { .. } => Some(ErrorKind::Timeout),
            Error::Network { .. } | Error::Protocol { .. } => Some(ErrorKind::NetworkError),
            Error::Auth { .. } => Some(ErrorKind::AuthError),
            Error::NotFound { .. } => Some(ErrorKind::NotFound),
            Error::DiscoverySubscriptionLost { .. } => Some(ErrorKind::DiscoverySubscriptionLost),
            Error::BridgeUnavailable { .. } | Error::Io(_) => Some(ErrorKind::BridgeUnavailable),
            _ => None,
        }
    }

    /// Check if this error should trigger application exit
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::BridgeNotFound | Error::Terminal { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
