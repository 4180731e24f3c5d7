//! Custom widget components

mod device_table;
mod dialog;
mod header;
mod log_pane;
mod status_bar;

pub use device_table::DeviceTable;
pub use dialog::InputDialog;
pub use header::MainHeader;
pub use log_pane::LogPane;
pub use status_bar::StatusBar;
