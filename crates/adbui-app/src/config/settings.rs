//! Settings loading

use std::path::{Path, PathBuf};

use adbui_core::prelude::*;

use super::types::Settings;

pub const CONFIG_DIR: &str = "adbui";
pub const CONFIG_FILENAME: &str = "config.toml";

/// `<config_dir>/adbui/config.toml`, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

/// Load settings from `path`, or the default location when `None`
///
/// Never fails: a missing file yields defaults, an unreadable or invalid
/// one is logged and also yields defaults.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                debug!("No config directory on this platform, using defaults");
                return Settings::default();
            }
        },
    };

    match read_settings(&config_path) {
        Ok(settings) => {
            debug!("Loaded settings from {:?}", config_path);
            settings
        }
        // Only an explicitly named file is expected to exist
        Err(e @ Error::ConfigNotFound { .. }) if path.is_some() => {
            warn!("{}, using defaults", e);
            Settings::default()
        }
        Err(Error::ConfigNotFound { .. }) => {
            debug!("No config file at {:?}, using defaults", config_path);
            Settings::default()
        }
        Err(e) => {
            warn!("{}, using defaults", e);
            Settings::default()
        }
    }
}

/// Read and parse one settings file
pub fn read_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::ConfigNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::config(format!("Failed to read {}: {}", path.display(), e)),
    })?;
    toml::from_str(&content)
        .map_err(|e| Error::config(format!("Failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_missing_file() {
        let temp = tempdir().unwrap();
        let settings = load_settings(Some(&temp.path().join("nope.toml")));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        let config = r#"
[bridge]
adb_path = "/opt/sdk/platform-tools/adb"
poll_interval_ms = 1000

[discovery]
enabled = false

[ui]
show_logs = true
"#;
        std::fs::write(&path, config).unwrap();

        let settings = load_settings(Some(&path));
        assert_eq!(
            settings.bridge.adb_path,
            Some(PathBuf::from("/opt/sdk/platform-tools/adb"))
        );
        assert_eq!(settings.bridge.poll_interval_ms, 1000);
        assert_eq!(settings.bridge.list_timeout_ms, 5000);
        assert!(!settings.discovery.enabled);
        assert!(settings.ui.show_logs);
        assert_eq!(settings.ui.max_log_lines, 500);
    }

    #[test]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[bridge\npoll_interval_ms = ").unwrap();

        assert_eq!(load_settings(Some(&path)), Settings::default());
    }

    #[test]
    fn test_load_settings_wrong_type_falls_back() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[bridge]\npoll_interval_ms = \"fast\"\n").unwrap();

        assert_eq!(load_settings(Some(&path)), Settings::default());
    }

    #[test]
    fn test_read_settings_reports_missing_and_invalid_files() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(matches!(
            read_settings(&missing),
            Err(Error::ConfigNotFound { path }) if path == missing
        ));

        let path = temp.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[bridge\n").unwrap();
        let err = read_settings(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_default_config_path_shape() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("adbui/config.toml"));
        }
    }
}
