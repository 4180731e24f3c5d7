//! Tool availability checking for the debug bridge
//!
//! Locates the `adb` executable once at startup: an explicit override first,
//! then `PATH`, then `platform-tools/` under `ANDROID_HOME` / `ANDROID_SDK_ROOT`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use adbui_core::prelude::*;
use tokio::process::Command;

/// Cached availability of the `adb` executable
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Path to a working adb executable, if found
    pub adb_path: Option<PathBuf>,

    /// First line of `adb version`
    pub adb_version: Option<String>,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub async fn check(adb_override: Option<&Path>) -> Self {
        for path in Self::get_adb_paths(adb_override) {
            if let Some(version) = Self::probe(&path).await {
                info!("Using adb at {} ({})", path.display(), version);
                return Self {
                    adb_path: Some(path),
                    adb_version: Some(version),
                };
            }
        }

        warn!("adb executable not found");
        Self::default()
    }

    /// Run `adb version` and return its first line on success
    async fn probe(path: &Path) -> Option<String> {
        let output = Command::new(path)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .inspect_err(|e| debug!("adb check failed for {}: {}", path.display(), e))
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Some(
            stdout
                .lines()
                .next()
                .unwrap_or("Android Debug Bridge")
                .trim()
                .to_string(),
        )
    }

    /// Get list of paths to try for the adb command
    fn get_adb_paths(adb_override: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = adb_override {
            // An explicit path is authoritative
            return vec![path.to_path_buf()];
        }

        let mut paths = Vec::new();
        if let Ok(found) = which::which("adb") {
            paths.push(found);
        }

        let exe = if cfg!(windows) { "adb.exe" } else { "adb" };
        for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
            if let Ok(root) = std::env::var(var) {
                paths.push(PathBuf::from(root).join("platform-tools").join(exe));
            }
        }

        paths.dedup();
        paths
    }

    /// Resolved adb path, or the fatal "not found" error
    pub fn require_adb(&self) -> Result<&Path> {
        self.adb_path.as_deref().ok_or(Error::BridgeNotFound)
    }

    /// Get user-friendly message for a missing adb
    pub fn adb_unavailable_message(&self) -> Option<&'static str> {
        if self.adb_path.is_some() {
            None
        } else {
            Some("adb not found. Install Android platform-tools, set ANDROID_HOME, or pass --adb <path>.")
        }
    }
}
