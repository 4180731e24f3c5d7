//! Semantic style builders

use adbui_core::{BridgeHealth, DeviceStatus};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, BorderType, Borders};

use super::palette;

pub fn text_primary() -> Style {
    Style::default().fg(palette::TEXT_PRIMARY)
}

pub fn text_secondary() -> Style {
    Style::default().fg(palette::TEXT_SECONDARY)
}

pub fn text_muted() -> Style {
    Style::default().fg(palette::TEXT_MUTED)
}

pub fn accent_bold() -> Style {
    Style::default()
        .fg(palette::ACCENT)
        .add_modifier(Modifier::BOLD)
}

pub fn status_red() -> Style {
    Style::default().fg(palette::STATUS_RED)
}

pub fn status_yellow() -> Style {
    Style::default().fg(palette::STATUS_YELLOW)
}

/// Keybinding hint
pub fn keybinding() -> Style {
    Style::default().fg(palette::STATUS_YELLOW)
}

/// "Black on Cyan" selected row
pub fn focused_selected() -> Style {
    Style::default()
        .fg(palette::CONTRAST_FG)
        .bg(palette::ACCENT)
        .add_modifier(Modifier::BOLD)
}

pub fn glass_block(focused: bool) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if focused {
            Style::default().fg(palette::BORDER_ACTIVE)
        } else {
            Style::default().fg(palette::BORDER_DIM)
        })
}

pub fn modal_block(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(palette::BORDER_ACTIVE))
        .style(Style::default().bg(palette::POPUP_BG))
}

/// Color for a device status cell
pub fn device_status(status: DeviceStatus) -> Style {
    let fg = match status {
        DeviceStatus::Connected => palette::STATUS_GREEN,
        DeviceStatus::Pairing => palette::STATUS_MAGENTA,
        DeviceStatus::Connecting => palette::STATUS_BLUE,
        DeviceStatus::Unauthorized => palette::STATUS_YELLOW,
        DeviceStatus::Offline => palette::STATUS_RED,
        DeviceStatus::Disconnected => palette::TEXT_SECONDARY,
        DeviceStatus::Unknown => palette::TEXT_MUTED,
    };
    let style = Style::default().fg(fg);
    if status == DeviceStatus::Connected {
        style.add_modifier(Modifier::BOLD)
    } else {
        style
    }
}

/// Indicator for the adb server: `(icon, label, style)`
pub fn health_indicator(health: &BridgeHealth) -> (&'static str, &'static str, Style) {
    match health {
        BridgeHealth::Starting => ("○", "starting", text_muted()),
        BridgeHealth::Available => ("●", "adb ok", Style::default().fg(palette::STATUS_GREEN)),
        BridgeHealth::Degraded { .. } => ("◐", "adb slow", status_yellow()),
        BridgeHealth::Unavailable { .. } => ("✗", "adb down", status_red()),
    }
}
