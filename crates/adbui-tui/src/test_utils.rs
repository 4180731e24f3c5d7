//! Test utilities for TUI rendering verification
//!
//! Renders into ratatui's `TestBackend` so widget and full-screen tests run
//! without a real terminal.

use std::time::Instant;

use adbui_app::AppState;
use adbui_core::{BridgeState, DeviceId, DeviceIdentity, DeviceRecord, NetworkAddress};
use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::widgets::Widget;
use ratatui::Frame;
use ratatui::Terminal;

pub const TEST_WIDTH: u16 = 80;
pub const TEST_HEIGHT: u16 = 24;

/// Thin wrapper around a `TestBackend` terminal
pub struct TestTerminal {
    pub terminal: Terminal<TestBackend>,
}

impl TestTerminal {
    /// 80x24 terminal
    pub fn new() -> Self {
        Self::with_size(TEST_WIDTH, TEST_HEIGHT)
    }

    pub fn with_size(width: u16, height: u16) -> Self {
        let backend = TestBackend::new(width, height);
        let terminal = Terminal::new(backend).expect("Failed to create test terminal");
        Self { terminal }
    }

    pub fn area(&self) -> Rect {
        let size = self.terminal.size().expect("Failed to get terminal size");
        Rect::new(0, 0, size.width, size.height)
    }

    pub fn render_widget<W: Widget>(&mut self, widget: W, area: Rect) {
        self.terminal
            .draw(|frame| frame.render_widget(widget, area))
            .expect("Failed to render widget");
    }

    /// Draw a full frame, e.g. `render::view`
    pub fn draw_with<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Frame),
    {
        self.terminal.draw(f).expect("Failed to draw frame");
    }

    pub fn buffer(&self) -> &Buffer {
        self.terminal.backend().buffer()
    }

    pub fn buffer_contains(&self, text: &str) -> bool {
        buffer_to_string(self.buffer()).contains(text)
    }

    pub fn line_contains(&self, line: u16, text: &str) -> bool {
        line_content(self.buffer(), line).contains(text)
    }

    /// Whole buffer as text (handy in assertion messages)
    pub fn content(&self) -> String {
        buffer_to_string(self.buffer())
    }
}

impl Default for TestTerminal {
    fn default() -> Self {
        Self::new()
    }
}

fn buffer_to_string(buffer: &Buffer) -> String {
    let mut result = String::new();
    for y in 0..buffer.area.height {
        result.push_str(&line_content(buffer, y));
        result.push('\n');
    }
    result
}

fn line_content(buffer: &Buffer, line: u16) -> String {
    let mut result = String::new();
    if line < buffer.area.height {
        for x in 0..buffer.area.width {
            result.push_str(buffer[(x, line)].symbol());
        }
    }
    result
}

/// Connected USB device
pub fn usb_device(id: u64, serial: &str, model: &str) -> DeviceRecord {
    let mut record = DeviceRecord::new(
        DeviceId(id),
        DeviceIdentity::from_serial(serial),
        Instant::now(),
    );
    record.model = Some(model.to_string());
    record.bridge_state = BridgeState::Connected;
    record.paired = true;
    record
}

/// Wireless device advertising its pairing service
pub fn pairing_device(id: u64, name: &str, pairing: &str) -> DeviceRecord {
    let mut record = DeviceRecord::new(
        DeviceId(id),
        DeviceIdentity::from_device_key(name),
        Instant::now(),
    );
    record.name = Some(name.to_string());
    record.pairing_address = pairing.parse::<NetworkAddress>().ok();
    record
}

pub fn state_with_devices(devices: Vec<DeviceRecord>) -> AppState {
    let mut state = AppState::new();
    state.set_devices(devices);
    state
}
