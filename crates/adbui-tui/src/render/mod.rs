//! Main render/view function (View in TEA pattern)

use adbui_app::{AppState, UiMode};
use ratatui::Frame;

use crate::layout;
use crate::widgets::{DeviceTable, InputDialog, LogPane, MainHeader, StatusBar};

/// Render the complete UI from state
pub fn view(frame: &mut Frame, state: &AppState) {
    let areas = layout::create(frame.area(), state.show_logs);

    frame.render_widget(
        MainHeader::new(&state.bridge_health)
            .adb_version(state.adb_version.as_deref())
            .mdns(state.mdns_enabled),
        areas.header,
    );

    frame.render_widget(
        DeviceTable::new(&state.devices, state.selected).focused(state.ui_mode == UiMode::Normal),
        areas.devices,
    );

    if let Some(logs_area) = areas.logs {
        frame.render_widget(LogPane::new(&state.logs), logs_area);
    }

    frame.render_widget(
        StatusBar::new(state.devices.len(), state.connected_count())
            .global_error(state.global_error.as_ref()),
        areas.status,
    );

    match state.ui_mode {
        UiMode::Normal => {}
        UiMode::ConnectDialog => {
            frame.render_widget(
                InputDialog::new("Connect", "Device address (host or host:port)", &state.dialog_input)
                    .error(state.dialog_error.as_deref()),
                frame.area(),
            );
        }
        UiMode::PairDialog => {
            let target = state
                .dialog_target
                .as_ref()
                .map(|identity| {
                    state
                        .devices
                        .iter()
                        .find(|d| d.identity.overlaps(identity))
                        .map(|d| d.display_name())
                        .unwrap_or_else(|| identity.to_string())
                })
                .unwrap_or_default();
            frame.render_widget(
                InputDialog::new(
                    "Pair",
                    format!("Pairing code shown on {}", target),
                    &state.dialog_input,
                )
                .error(state.dialog_error.as_deref()),
                frame.area(),
            );
        }
    }
}
