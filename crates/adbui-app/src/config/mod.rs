//! Configuration file parsing for adbui
//!
//! Supports `<config_dir>/adbui/config.toml` (or an explicit `--config` path).

pub mod settings;
pub mod types;

pub use settings::{default_config_path, load_settings, read_settings, CONFIG_FILENAME};
pub use types::*;
