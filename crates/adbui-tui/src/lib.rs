//! adbui-tui - Terminal UI for adbui
//!
//! Renders the engine's [`AppState`](adbui_app::AppState) with ratatui and
//! feeds crossterm key events back into it as messages.

pub mod event;
pub mod layout;
pub mod render;
pub mod runner;
pub mod terminal;
pub mod theme;
pub mod widgets;

#[cfg(test)]
pub mod test_utils;

pub use runner::run;
