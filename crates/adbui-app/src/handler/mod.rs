//! Handler module - TEA update function and key mapping
//!
//! - `update`: main update() function and message dispatch
//! - `keys`: key event handlers per UI mode

pub(crate) mod keys;
pub(crate) mod update;

use adbui_core::NetworkAddress;

use crate::dispatcher::Command;

pub use keys::handle_key;
pub use update::update;

/// Actions that the engine performs after update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    /// Hand a command to the dispatcher
    Submit(Command),

    /// Wake the bridge poller now
    Refresh,

    /// Register a typed address, then connect to it
    ConnectAddress(NetworkAddress),
}

/// Result of processing a message
#[derive(Debug, Default)]
pub struct UpdateResult {
    /// Optional follow-up message to process
    pub message: Option<crate::message::Message>,
    /// Optional action for the engine to perform
    pub action: Option<UpdateAction>,
}

impl UpdateResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn message(msg: crate::message::Message) -> Self {
        Self {
            message: Some(msg),
            action: None,
        }
    }

    pub fn action(action: UpdateAction) -> Self {
        Self {
            message: None,
            action: Some(action),
        }
    }
}
