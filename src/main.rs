//! adbui - A terminal UI for managing wireless Android debug-bridge devices
//!
//! Binary entry point: CLI parsing, logging, startup checks, then either the
//! TUI or headless mode.

mod headless;

use std::path::PathBuf;

use adbui_app::config::{self, Settings};
use adbui_app::{AdbClient, Engine, MdnsBrowser, ToolAvailability};
use adbui_core::logging;
use clap::Parser;
use tracing::{error, info};

/// adbui - manage wireless adb devices from the terminal
#[derive(Parser, Debug)]
#[command(name = "adbui")]
#[command(about = "A terminal UI for managing wireless Android debug-bridge devices", long_about = None)]
struct Args {
    /// Config file (default: <config dir>/adbui/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to the adb executable
    #[arg(long, value_name = "PATH")]
    adb: Option<PathBuf>,

    /// Bridge poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    poll_interval: Option<u64>,

    /// Disable mDNS discovery
    #[arg(long)]
    no_mdns: bool,

    /// Run without the TUI, printing JSON events to stdout
    #[arg(long)]
    headless: bool,
}

impl Args {
    /// Command-line flags take precedence over the config file
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(adb) = &self.adb {
            settings.bridge.adb_path = Some(adb.clone());
        }
        if let Some(ms) = self.poll_interval {
            settings.bridge.poll_interval_ms = ms;
        }
        if self.no_mdns {
            settings.discovery.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    logging::init()?;

    let mut settings = config::load_settings(args.config.as_deref());
    args.apply_to(&mut settings);

    let tools = ToolAvailability::check(settings.bridge.adb_path.as_deref()).await;
    let adb_path = match tools.require_adb() {
        Ok(path) => path.to_path_buf(),
        Err(e) if e.is_fatal() => {
            error!("{}", e);
            eprintln!(
                "{}",
                tools.adb_unavailable_message().unwrap_or("adb not found")
            );
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let client = AdbClient::new(adb_path);
    let discovery = settings.discovery.enabled.then(MdnsBrowser::new);

    let mut engine = Engine::new(settings, client, discovery);
    engine.state.adb_version = tools.adb_version.clone();

    if args.headless {
        headless::runner::run_headless(engine).await?;
    } else {
        adbui_tui::run(engine).await?;
    }

    info!("adbui exited cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_settings() {
        let args = Args::parse_from([
            "adbui",
            "--adb",
            "/opt/adb",
            "--poll-interval",
            "750",
            "--no-mdns",
        ]);
        let mut settings = Settings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.bridge.adb_path, Some(PathBuf::from("/opt/adb")));
        assert_eq!(settings.bridge.poll_interval_ms, 750);
        assert!(!settings.discovery.enabled);
    }

    #[test]
    fn test_no_flags_keep_file_settings() {
        let args = Args::parse_from(["adbui"]);
        let mut settings = Settings::default();
        settings.bridge.poll_interval_ms = 1234;
        args.apply_to(&mut settings);

        assert_eq!(settings.bridge.poll_interval_ms, 1234);
        assert!(settings.discovery.enabled);
        assert!(!args.headless);
    }
}
