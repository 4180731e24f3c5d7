//! Key event handlers for different UI modes

use crate::input_key::InputKey;
use crate::message::Message;
use crate::state::{AppState, UiMode};

/// Convert key events to messages based on current UI mode
pub fn handle_key(state: &AppState, key: InputKey) -> Option<Message> {
    match state.ui_mode {
        UiMode::Normal => handle_key_normal(key),
        UiMode::ConnectDialog | UiMode::PairDialog => handle_key_dialog(state, key),
    }
}

fn handle_key_normal(key: InputKey) -> Option<Message> {
    match key {
        InputKey::Char('q') | InputKey::CharCtrl('c') => Some(Message::Quit),

        InputKey::Char('j') | InputKey::Down => Some(Message::SelectNext),
        InputKey::Char('k') | InputKey::Up => Some(Message::SelectPrevious),
        InputKey::Char('g') | InputKey::Home => Some(Message::SelectFirst),
        InputKey::Char('G') | InputKey::End => Some(Message::SelectLast),

        InputKey::Char('r') => Some(Message::Refresh),
        InputKey::Char('c') => Some(Message::ConnectSelected),
        InputKey::Char('p') => Some(Message::PairSelected),
        InputKey::Char('d') => Some(Message::DisconnectSelected),
        InputKey::Char('K') => Some(Message::RestartServer),
        InputKey::Char('D') => Some(Message::DisconnectAll),
        InputKey::Enter => Some(Message::ActivateSelected),

        InputKey::Char('l') => Some(Message::ToggleLogs),
        _ => None,
    }
}

fn handle_key_dialog(state: &AppState, key: InputKey) -> Option<Message> {
    match key {
        InputKey::Esc => Some(Message::DialogCancel),
        InputKey::CharCtrl('c') => Some(Message::Quit),
        InputKey::Enter => Some(Message::DialogSubmit),
        InputKey::Backspace => Some(Message::DialogBackspace),
        InputKey::CharCtrl('u') => Some(Message::DialogClear),
        InputKey::Char(c) if accepts(state.ui_mode, c) => Some(Message::DialogInput(c)),
        _ => None,
    }
}

/// Characters each dialog accepts
fn accepts(mode: UiMode, c: char) -> bool {
    match mode {
        UiMode::PairDialog => c.is_ascii_digit(),
        UiMode::ConnectDialog => c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '[' | ']'),
        UiMode::Normal => false,
    }
}
