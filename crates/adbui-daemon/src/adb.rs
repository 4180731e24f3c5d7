//! The bridge client: `adb` subprocess invocation and output classification
//!
//! Every operation spawns one short-lived `adb` process. Timeouts are applied
//! by callers with `tokio::time::timeout`; dropping the future kills the
//! child because every command is spawned with `kill_on_drop(true)`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use adbui_core::prelude::*;
use adbui_core::{BridgeDevice, NetworkAddress};
use tokio::process::Command;

use crate::devices::parse_devices_output;

/// Operations on the debug bridge
///
/// Implemented by [`AdbClient`] in production and by `FakeBridge` in tests.
#[trait_variant::make(BridgeClient: Send)]
pub trait LocalBridgeClient {
    /// List devices known to the bridge server
    async fn list_devices(&self) -> Result<Vec<BridgeDevice>>;

    /// Pair with a device's pairing endpoint using a six-digit code
    async fn pair(&self, address: &NetworkAddress, code: &str) -> Result<()>;

    /// Connect to a device's connect endpoint
    async fn connect(&self, address: &NetworkAddress) -> Result<()>;

    /// Disconnect one device by serial or address
    async fn disconnect(&self, target: &str) -> Result<()>;

    /// Disconnect every network-attached device
    async fn disconnect_all(&self) -> Result<()>;

    /// Kill and restart the bridge server
    async fn restart_server(&self) -> Result<()>;
}

/// Captured output of one adb invocation
#[derive(Debug, Clone)]
pub struct AdbOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl AdbOutput {
    /// stdout and stderr joined; adb reports errors on either stream
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Bridge client backed by the `adb` executable
#[derive(Debug, Clone)]
pub struct AdbClient {
    adb_path: PathBuf,
}

impl AdbClient {
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    /// Run `adb <args>` to completion
    pub async fn run(&self, args: &[&str]) -> Result<AdbOutput> {
        debug!("$ adb {}", args.join(" "));

        let output = Command::new(&self.adb_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::BridgeNotFound
                } else {
                    Error::bridge_unavailable(format!("failed to run adb: {}", e))
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stdout.is_empty() {
            trace!("adb stdout: {}", stdout);
        }
        if !stderr.is_empty() {
            trace!("adb stderr: {}", stderr);
        }

        Ok(AdbOutput {
            stdout,
            stderr,
            success: output.status.success(),
        })
    }
}

impl BridgeClient for AdbClient {
    async fn list_devices(&self) -> Result<Vec<BridgeDevice>> {
        let output = self.run(&["devices", "-l"]).await?;
        if !output.success {
            return Err(Error::bridge_unavailable(output.combined()));
        }
        parse_devices_output(&output.combined())
    }

    async fn pair(&self, address: &NetworkAddress, code: &str) -> Result<()> {
        let target = address.to_string();
        let output = self.run(&["pair", &target, code]).await?;
        classify_pair_output(&output.combined())
    }

    async fn connect(&self, address: &NetworkAddress) -> Result<()> {
        let target = address.to_string();
        let output = self.run(&["connect", &target]).await?;
        classify_connect_output(&output.combined())
    }

    async fn disconnect(&self, target: &str) -> Result<()> {
        let output = self.run(&["disconnect", target]).await?;
        classify_disconnect_output(&output.combined())
    }

    async fn disconnect_all(&self) -> Result<()> {
        let output = self.run(&["disconnect"]).await?;
        if output.success {
            Ok(())
        } else {
            Err(Error::bridge_unavailable(output.combined()))
        }
    }

    async fn restart_server(&self) -> Result<()> {
        // kill-server fails harmlessly when no server is running
        let kill = self.run(&["kill-server"]).await?;
        if !kill.success {
            debug!("adb kill-server: {}", kill.combined());
        }

        let start = self.run(&["start-server"]).await?;
        if start.success {
            Ok(())
        } else {
            Err(Error::bridge_unavailable(start.combined()))
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Output classification
// ─────────────────────────────────────────────────────────────────

/// `adb pair` prints "Successfully paired to ..." on success
pub fn classify_pair_output(output: &str) -> Result<()> {
    let lower = output.to_lowercase();
    if lower.contains("successfully paired") {
        Ok(())
    } else if lower.contains("wrong password") || lower.contains("incorrect") {
        Err(Error::auth(summarize(output)))
    } else if lower.contains("unable to start pairing") || lower.contains("no route") {
        Err(Error::network(summarize(output)))
    } else if output.trim().is_empty() {
        Err(Error::protocol("adb pair produced no output"))
    } else {
        Err(Error::network(summarize(output)))
    }
}

/// `adb connect` exits 0 even on failure; only the text tells
pub fn classify_connect_output(output: &str) -> Result<()> {
    let lower = output.to_lowercase();
    if lower.contains("cannot") || lower.contains("failed") || lower.contains("unable") {
        if lower.contains("authenticate") || lower.contains("unauthorized") {
            Err(Error::auth(summarize(output)))
        } else {
            Err(Error::network(summarize(output)))
        }
    } else if lower.contains("connected to") {
        Ok(())
    } else {
        Err(Error::protocol(summarize(output)))
    }
}

pub fn classify_disconnect_output(output: &str) -> Result<()> {
    let lower = output.to_lowercase();
    if lower.contains("no such device") || lower.contains("not found") {
        Err(Error::not_found(summarize(output)))
    } else if lower.contains("error") {
        Err(Error::network(summarize(output)))
    } else {
        Ok(())
    }
}

fn summarize(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("no output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pair_success() {
        let out = "Successfully paired to 192.168.1.5:41234 [guid=adb-R5CT-abc]";
        assert!(classify_pair_output(out).is_ok());
    }

    #[test]
    fn test_classify_pair_wrong_code() {
        let out = "Failed: Wrong password or connection was dropped.";
        let err = classify_pair_output(out).unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
    }

    #[test]
    fn test_classify_pair_unreachable() {
        let out = "Failed: Unable to start pairing client.";
        let err = classify_pair_output(out).unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
    }

    #[test]
    fn test_classify_pair_empty_output() {
        let err = classify_pair_output("").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_classify_connect() {
        assert!(classify_connect_output("connected to 192.168.1.5:37000").is_ok());
        assert!(classify_connect_output("already connected to 192.168.1.5:37000").is_ok());

        let err = classify_connect_output(
            "failed to connect to '192.168.1.5:37000': Connection refused",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Network { .. }));

        let err = classify_connect_output("cannot connect to 192.168.1.5:37000: No route to host")
            .unwrap_err();
        assert!(matches!(err, Error::Network { .. }));

        let err = classify_connect_output("failed to authenticate to 192.168.1.5:37000")
            .unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
    }

    #[test]
    fn test_classify_connect_unexpected_output() {
        let err = classify_connect_output("something odd").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_classify_disconnect() {
        assert!(classify_disconnect_output("disconnected 192.168.1.5:37000").is_ok());

        let err =
            classify_disconnect_output("error: no such device '192.168.1.5:37000'").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_combined_output() {
        let out = AdbOutput {
            stdout: "a".into(),
            stderr: "b".into(),
            success: true,
        };
        assert_eq!(out.combined(), "a\nb");
    }

    #[tokio::test]
    async fn test_missing_binary_is_bridge_not_found() {
        let client = AdbClient::new("/nonexistent/path/to/adb");
        let err = client.run(&["version"]).await.unwrap_err();
        assert!(matches!(err, Error::BridgeNotFound));
    }
}
