//! Bottom status bar
//!
//! Device counts plus either the registry-wide error (restart /
//! disconnect-all) or the key hints.

use adbui_core::LastError;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::theme::styles;

const HINTS: &[(&str, &str)] = &[
    ("Enter", "act"),
    ("c", "connect"),
    ("p", "pair"),
    ("d", "disconnect"),
    ("r", "refresh"),
    ("K", "restart adb"),
    ("l", "log"),
    ("q", "quit"),
];

pub struct StatusBar<'a> {
    total: usize,
    connected: usize,
    global_error: Option<&'a LastError>,
}

impl<'a> StatusBar<'a> {
    pub fn new(total: usize, connected: usize) -> Self {
        Self {
            total,
            connected,
            global_error: None,
        }
    }

    pub fn global_error(mut self, error: Option<&'a LastError>) -> Self {
        self.global_error = error;
        self
    }
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut spans = vec![
            Span::raw(" "),
            Span::styled(
                format!("{} devices, {} connected", self.total, self.connected),
                styles::text_secondary(),
            ),
        ];

        if let Some(error) = self.global_error {
            spans.push(Span::styled("  ", styles::text_muted()));
            spans.push(Span::styled(
                format!("{}: {}", error.kind, error.message),
                styles::status_red(),
            ));
        } else {
            for (key, label) in HINTS {
                spans.push(Span::raw("  "));
                spans.push(Span::styled(*key, styles::keybinding()));
                spans.push(Span::styled(format!(" {}", label), styles::text_muted()));
            }
        }

        Paragraph::new(Line::from(spans)).render(area, buf);
    }
}
