//! Modal text-input dialog (connect address, pairing code)

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Clear, Paragraph, Widget},
};

use crate::layout::centered_rect;
use crate::theme::styles;

const DIALOG_WIDTH: u16 = 52;
const DIALOG_HEIGHT: u16 = 8;

pub struct InputDialog<'a> {
    title: &'a str,
    prompt: String,
    input: &'a str,
    error: Option<&'a str>,
}

impl<'a> InputDialog<'a> {
    pub fn new(title: &'a str, prompt: impl Into<String>, input: &'a str) -> Self {
        Self {
            title,
            prompt: prompt.into(),
            input,
            error: None,
        }
    }

    pub fn error(mut self, error: Option<&'a str>) -> Self {
        self.error = error;
        self
    }
}

impl Widget for InputDialog<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect(DIALOG_WIDTH, DIALOG_HEIGHT, area);
        Clear.render(popup, buf);

        let title = format!(" {} ", self.title);
        let block = styles::modal_block(&title);
        let inner = block.inner(popup);
        block.render(popup, buf);

        let mut lines = vec![
            Line::from(Span::styled(self.prompt, styles::text_secondary())),
            Line::from(""),
            Line::from(vec![
                Span::styled("> ", styles::accent_bold()),
                Span::styled(self.input, styles::text_primary()),
                Span::styled("_", styles::accent_bold()),
            ]),
        ];

        match self.error {
            Some(error) => lines.push(Line::from(Span::styled(error, styles::status_red()))),
            None => lines.push(Line::from("")),
        }

        lines.push(Line::from(vec![
            Span::styled("Enter", styles::keybinding()),
            Span::styled(" submit  ", styles::text_muted()),
            Span::styled("Esc", styles::keybinding()),
            Span::styled(" cancel", styles::text_muted()),
        ]));

        Paragraph::new(lines).render(inner, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestTerminal;

    #[test]
    fn test_dialog_renders_input_and_error() {
        let mut term = TestTerminal::new();
        let area = term.area();
        term.render_widget(
            InputDialog::new("Pair", "Code shown on the device", "1234").error(Some("Enter the 6-digit code")),
            area,
        );

        assert!(term.buffer_contains(" Pair "));
        assert!(term.buffer_contains("Code shown on the device"));
        assert!(term.buffer_contains("> 1234_"));
        assert!(term.buffer_contains("Enter the 6-digit code"));
        assert!(term.buffer_contains("Esc cancel"));
    }
}
