//! Screen layout definitions for the TUI

use ratatui::layout::{Constraint, Layout, Rect};

/// Rows given to the log pane when it is visible
pub const LOG_PANE_HEIGHT: u16 = 8;

/// Screen areas for the main layout
#[derive(Debug, Clone, Copy)]
pub struct ScreenAreas {
    /// Title, adb version and mDNS state
    pub header: Rect,

    /// Device table
    pub devices: Rect,

    /// Activity log, when toggled on
    pub logs: Option<Rect>,

    /// One-line status and key hints
    pub status: Rect,
}

/// Split the screen into header / devices / (logs) / status bar
///
/// The log pane is dropped when the terminal is too short to keep at least
/// three rows for the table.
pub fn create(area: Rect, show_logs: bool) -> ScreenAreas {
    let fits_logs = area.height >= 3 + 3 + LOG_PANE_HEIGHT + 1;

    if show_logs && fits_logs {
        let chunks = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(LOG_PANE_HEIGHT),
            Constraint::Length(1),
        ])
        .split(area);

        ScreenAreas {
            header: chunks[0],
            devices: chunks[1],
            logs: Some(chunks[2]),
            status: chunks[3],
        }
    } else {
        let chunks = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);

        ScreenAreas {
            header: chunks[0],
            devices: chunks[1],
            logs: None,
            status: chunks[2],
        }
    }
}

/// Fixed-size rectangle centered in `area`, clamped to fit
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}
