//! Header bar
//!
//! Shows the adb server health, adb version and whether mDNS discovery is on.

use adbui_core::BridgeHealth;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::theme::{palette, styles};

pub struct MainHeader<'a> {
    health: &'a BridgeHealth,
    adb_version: Option<&'a str>,
    mdns_enabled: bool,
}

impl<'a> MainHeader<'a> {
    pub fn new(health: &'a BridgeHealth) -> Self {
        Self {
            health,
            adb_version: None,
            mdns_enabled: false,
        }
    }

    pub fn adb_version(mut self, version: Option<&'a str>) -> Self {
        self.adb_version = version;
        self
    }

    pub fn mdns(mut self, enabled: bool) -> Self {
        self.mdns_enabled = enabled;
        self
    }
}

impl Widget for MainHeader<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = styles::glass_block(false).style(Style::default().bg(palette::CARD_BG));
        let inner = block.inner(area);
        block.render(area, buf);

        if inner.height == 0 || inner.width == 0 {
            return;
        }

        let (icon, label, health_style) = styles::health_indicator(self.health);

        let mut spans = vec![
            Span::raw(" "),
            Span::styled(icon, health_style),
            Span::raw(" "),
            Span::styled("adbui", styles::accent_bold()),
            Span::raw("  "),
            Span::styled(label, health_style),
        ];

        if let Some(version) = self.adb_version {
            spans.push(Span::styled(" / ", styles::text_muted()));
            spans.push(Span::styled(
                format!("adb {}", version),
                styles::text_secondary(),
            ));
        }

        spans.push(Span::styled(" / ", styles::text_muted()));
        if self.mdns_enabled {
            spans.push(Span::styled("mDNS on", styles::text_secondary()));
        } else {
            spans.push(Span::styled("mDNS off", styles::text_muted()));
        }

        Paragraph::new(Line::from(spans)).render(inner, buf);
    }
}
