//! Message types for the application (TEA pattern)

use crate::input_key::InputKey;

/// All possible messages/actions in the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Keyboard event from terminal
    Key(InputKey),

    /// Tick event for periodic updates
    Tick,

    /// Request to quit the application
    Quit,

    // ─────────────────────────────────────────────────────────
    // Device list navigation
    // ─────────────────────────────────────────────────────────
    SelectNext,
    SelectPrevious,
    SelectFirst,
    SelectLast,

    // ─────────────────────────────────────────────────────────
    // Device commands
    // ─────────────────────────────────────────────────────────
    /// Force an immediate bridge poll (`r`)
    Refresh,
    /// Connect the selected device, or ask for an address (`c`)
    ConnectSelected,
    /// Open the pairing-code dialog for the selected device (`p`)
    PairSelected,
    DisconnectSelected,
    RestartServer,
    DisconnectAll,
    /// Enter: pair if pairing, connect if paired and not connected
    ActivateSelected,

    // ─────────────────────────────────────────────────────────
    // Dialog input
    // ─────────────────────────────────────────────────────────
    DialogInput(char),
    DialogBackspace,
    DialogClear,
    DialogSubmit,
    DialogCancel,

    /// A submitted command finished; `outcome` carries the error text
    CommandCompleted {
        description: String,
        outcome: Result<(), String>,
    },

    ToggleLogs,
}
