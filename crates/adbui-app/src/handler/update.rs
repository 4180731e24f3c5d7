//! Main update function - handles state transitions (TEA pattern)

use adbui_core::NetworkAddress;

use super::{keys::handle_key, UpdateAction, UpdateResult};
use crate::dispatcher::Command;
use crate::message::Message;
use crate::state::{AppPhase, AppState, UiMode};

/// Port `adb connect` assumes when none is typed
const DEFAULT_ADB_PORT: u16 = 5555;

const PAIRING_CODE_LEN: usize = 6;

/// Process a message and update state
/// Returns optional follow-up message and/or action
pub fn update(state: &mut AppState, message: Message) -> UpdateResult {
    match message {
        Message::Quit => {
            state.phase = AppPhase::Quitting;
            UpdateResult::none()
        }

        Message::Key(key) => match handle_key(state, key) {
            Some(msg) => UpdateResult::message(msg),
            None => UpdateResult::none(),
        },

        Message::Tick => UpdateResult::none(),

        // ─────────────────────────────────────────────────────────
        // Navigation
        // ─────────────────────────────────────────────────────────
        Message::SelectNext => {
            state.select_next();
            UpdateResult::none()
        }
        Message::SelectPrevious => {
            state.select_previous();
            UpdateResult::none()
        }
        Message::SelectFirst => {
            state.select_first();
            UpdateResult::none()
        }
        Message::SelectLast => {
            state.select_last();
            UpdateResult::none()
        }

        // ─────────────────────────────────────────────────────────
        // Commands
        // ─────────────────────────────────────────────────────────
        Message::Refresh => {
            state.log_info("Refreshing device list");
            UpdateResult::action(UpdateAction::Refresh)
        }

        Message::ConnectSelected => handle_connect_selected(state),
        Message::PairSelected => handle_pair_selected(state),

        Message::DisconnectSelected => match state.selected_device() {
            Some(device) => {
                let identity = device.identity.clone();
                UpdateResult::action(UpdateAction::Submit(Command::Disconnect { identity }))
            }
            None => {
                state.log_warn("No device selected");
                UpdateResult::none()
            }
        },

        Message::RestartServer => {
            state.log_info("Restarting adb server");
            UpdateResult::action(UpdateAction::Submit(Command::RestartServer))
        }

        Message::DisconnectAll => {
            state.log_info("Disconnecting all network devices");
            UpdateResult::action(UpdateAction::Submit(Command::DisconnectAll))
        }

        Message::ActivateSelected => {
            let Some(device) = state.selected_device() else {
                return UpdateResult::message(Message::ConnectSelected);
            };
            if device.is_pairing() && !device.is_connected() {
                UpdateResult::message(Message::PairSelected)
            } else if device.paired && !device.is_connected() {
                UpdateResult::message(Message::ConnectSelected)
            } else {
                let name = device.display_name();
                let reason = if device.is_connected() {
                    "already connected"
                } else {
                    "not paired; enable pairing on the device"
                };
                state.log_warn(format!("{}: {}", name, reason));
                UpdateResult::none()
            }
        }

        Message::CommandCompleted {
            description,
            outcome,
        } => {
            match outcome {
                Ok(()) => state.log_info(format!("{}: ok", description)),
                Err(e) => state.log_error(format!("{}: {}", description, e)),
            }
            UpdateResult::none()
        }

        // ─────────────────────────────────────────────────────────
        // Dialogs
        // ─────────────────────────────────────────────────────────
        Message::DialogInput(c) => {
            if state.ui_mode == UiMode::PairDialog && state.dialog_input.len() >= PAIRING_CODE_LEN
            {
                return UpdateResult::none();
            }
            state.dialog_input.push(c);
            state.dialog_error = None;
            UpdateResult::none()
        }
        Message::DialogBackspace => {
            state.dialog_input.pop();
            state.dialog_error = None;
            UpdateResult::none()
        }
        Message::DialogClear => {
            state.dialog_input.clear();
            state.dialog_error = None;
            UpdateResult::none()
        }
        Message::DialogCancel => {
            state.close_dialog();
            UpdateResult::none()
        }
        Message::DialogSubmit => handle_dialog_submit(state),

        Message::ToggleLogs => {
            state.show_logs = !state.show_logs;
            UpdateResult::none()
        }
    }
}

fn handle_connect_selected(state: &mut AppState) -> UpdateResult {
    let Some(device) = state.selected_device() else {
        state.open_dialog(UiMode::ConnectDialog, None);
        return UpdateResult::none();
    };

    if device.is_connected() {
        let name = device.display_name();
        state.log_warn(format!("{} is already connected", name));
        return UpdateResult::none();
    }

    match device.identity.address {
        Some(_) => {
            let identity = device.identity.clone();
            UpdateResult::action(UpdateAction::Submit(Command::Connect { identity }))
        }
        // Nothing to connect to yet: ask for the address
        None => {
            state.open_dialog(UiMode::ConnectDialog, None);
            UpdateResult::none()
        }
    }
}

fn handle_pair_selected(state: &mut AppState) -> UpdateResult {
    match state.selected_device() {
        Some(device) if device.is_pairing() => {
            let identity = device.identity.clone();
            state.open_dialog(UiMode::PairDialog, Some(identity));
        }
        Some(device) => {
            let name = device.display_name();
            state.log_warn(format!(
                "{} is not in pairing mode (Developer options > Wireless debugging > Pair device with pairing code)",
                name
            ));
        }
        None => state.log_warn("No device selected"),
    }
    UpdateResult::none()
}

fn handle_dialog_submit(state: &mut AppState) -> UpdateResult {
    match state.ui_mode {
        UiMode::ConnectDialog => match parse_target(&state.dialog_input) {
            Ok(address) => {
                state.close_dialog();
                state.log_info(format!("Connecting to {}", address));
                UpdateResult::action(UpdateAction::ConnectAddress(address))
            }
            Err(e) => {
                state.dialog_error = Some(e);
                UpdateResult::none()
            }
        },
        UiMode::PairDialog => {
            let code = state.dialog_input.clone();
            if code.len() != PAIRING_CODE_LEN || !code.chars().all(|c| c.is_ascii_digit()) {
                state.dialog_error = Some(format!("Enter the {}-digit code", PAIRING_CODE_LEN));
                return UpdateResult::none();
            }
            let Some(identity) = state.dialog_target.clone() else {
                state.close_dialog();
                return UpdateResult::none();
            };
            state.close_dialog();
            UpdateResult::action(UpdateAction::Submit(Command::Pair { identity, code }))
        }
        UiMode::Normal => UpdateResult::none(),
    }
}

/// Parse `host[:port]`, defaulting the port to 5555
fn parse_target(input: &str) -> std::result::Result<NetworkAddress, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Enter host:port".to_string());
    }
    let with_port = if input.contains(':') {
        input.to_string()
    } else {
        format!("{}:{}", input, DEFAULT_ADB_PORT)
    };
    with_port.parse().map_err(|e: adbui_core::Error| e.to_string())
}
