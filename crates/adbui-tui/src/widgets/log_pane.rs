//! Activity log pane
//!
//! Tail of the in-app log, newest line at the bottom.

use std::collections::VecDeque;

use adbui_app::{LogLevel, LogLine};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::theme::{palette, styles};

pub struct LogPane<'a> {
    lines: &'a VecDeque<LogLine>,
}

impl<'a> LogPane<'a> {
    pub fn new(lines: &'a VecDeque<LogLine>) -> Self {
        Self { lines }
    }
}

fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Info => Style::default().fg(palette::LOG_INFO),
        LogLevel::Warn => Style::default().fg(palette::LOG_WARNING),
        LogLevel::Error => Style::default().fg(palette::LOG_ERROR),
    }
}

fn format_line(line: &LogLine) -> Line<'_> {
    Line::from(vec![
        Span::styled(line.at.format("%H:%M:%S ").to_string(), styles::text_muted()),
        Span::styled(line.message.as_str(), level_style(line.level)),
    ])
}

impl Widget for LogPane<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = styles::glass_block(false).title(" Log ");
        let inner = block.inner(area);
        block.render(area, buf);

        let visible = inner.height as usize;
        let skip = self.lines.len().saturating_sub(visible);
        let lines: Vec<Line> = self.lines.iter().skip(skip).map(format_line).collect();

        Paragraph::new(lines).render(inner, buf);
    }
}
