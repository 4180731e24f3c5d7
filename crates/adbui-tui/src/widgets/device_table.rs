//! Device table
//!
//! One row per merged device record. The status column shows the in-flight
//! command while one holds the device, otherwise the derived status.

use adbui_core::{DeviceRecord, Transport};
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, StatefulWidget, Table, TableState, Widget},
};

use crate::theme::{palette, styles};

const EMPTY_HINT: &str =
    "No devices yet. Enable Wireless debugging on a phone, or press c to connect by address.";

pub struct DeviceTable<'a> {
    devices: &'a [DeviceRecord],
    selected: Option<usize>,
    focused: bool,
}

impl<'a> DeviceTable<'a> {
    pub fn new(devices: &'a [DeviceRecord], selected: Option<usize>) -> Self {
        Self {
            devices,
            selected,
            focused: true,
        }
    }

    /// Dim the border while a dialog is open
    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }
}

/// Address column: network endpoint, pairing endpoint, or the USB serial
fn address_cell(device: &DeviceRecord) -> String {
    if let Some(address) = &device.identity.address {
        return address.to_string();
    }
    if let Some(pairing) = &device.pairing_address {
        return pairing.to_string();
    }
    match (&device.transport, &device.identity.serial) {
        (Some(Transport::Usb), Some(serial)) => format!("usb {}", serial),
        (_, Some(serial)) => serial.clone(),
        _ => "-".to_string(),
    }
}

fn status_cell(device: &DeviceRecord) -> Cell<'static> {
    match &device.pending_command {
        Some(pending) => Cell::from(Span::styled(
            format!("{}...", pending.kind),
            Style::default().fg(palette::STATUS_BLUE),
        )),
        None => {
            let status = device.status();
            Cell::from(Span::styled(status.label(), styles::device_status(status)))
        }
    }
}

fn error_cell(device: &DeviceRecord) -> Cell<'static> {
    match &device.last_error {
        Some(error) => Cell::from(Span::styled(
            format!("{}: {}", error.kind, error.message),
            styles::status_red(),
        )),
        None => Cell::from(""),
    }
}

fn device_row(device: &DeviceRecord) -> Row<'static> {
    let api = device
        .api_level
        .map(|level| level.to_string())
        .unwrap_or_else(|| "-".to_string());
    let paired = if device.paired { "yes" } else { "no" };

    Row::new(vec![
        Cell::from(Span::styled(device.display_name(), styles::text_primary())),
        Cell::from(Span::styled(address_cell(device), styles::text_secondary())),
        Cell::from(Span::styled(api, styles::text_secondary())),
        Cell::from(Span::styled(paired, styles::text_secondary())),
        status_cell(device),
        error_cell(device),
    ])
}

impl Widget for DeviceTable<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = styles::glass_block(self.focused)
            .title(Line::from(vec![
                Span::raw(" "),
                Span::styled("Devices", styles::accent_bold()),
                Span::styled(format!(" ({}) ", self.devices.len()), styles::text_muted()),
            ]))
            .style(Style::default().bg(palette::DEEPEST_BG));

        if self.devices.is_empty() {
            let inner = block.inner(area);
            block.render(area, buf);
            Paragraph::new(Span::styled(EMPTY_HINT, styles::text_muted()))
                .alignment(Alignment::Center)
                .wrap(ratatui::widgets::Wrap { trim: true })
                .render(inner, buf);
            return;
        }

        let header = Row::new(vec!["Name", "Address", "API", "Paired", "Status", "Last error"])
            .style(styles::text_muted());

        let widths = [
            Constraint::Length(20),
            Constraint::Length(22),
            Constraint::Length(4),
            Constraint::Length(6),
            Constraint::Length(13),
            Constraint::Min(10),
        ];

        let table = Table::new(self.devices.iter().map(device_row), widths)
            .header(header)
            .block(block)
            .row_highlight_style(styles::focused_selected())
            .highlight_symbol("> ");

        let mut table_state = TableState::default().with_selected(self.selected);
        StatefulWidget::render(table, area, buf, &mut table_state);
    }
}
