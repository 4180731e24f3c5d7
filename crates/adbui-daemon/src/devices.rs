//! Parsing of `adb devices -l`

use adbui_core::prelude::*;
use adbui_core::{BridgeDevice, BridgeState};

const HEADER: &str = "List of devices attached";

/// Parse the output of `adb devices -l` into bridge devices
///
/// Daemon chatter (`* daemon not running; starting now ...`) and the header
/// are skipped. Output that signals an unreachable server is an error.
pub fn parse_devices_output(output: &str) -> Result<Vec<BridgeDevice>> {
    if output.contains("cannot connect to daemon") || output.contains("failed to start daemon") {
        return Err(Error::bridge_unavailable(first_line(output)));
    }

    let devices = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with('*') && !line.starts_with("adb:"))
        .filter(|line| !line.starts_with(HEADER))
        .filter_map(parse_device_line)
        .collect();

    Ok(devices)
}

/// Parse one device row: `<serial> <state> [key:value ...]`
fn parse_device_line(line: &str) -> Option<BridgeDevice> {
    let mut tokens = line.split_whitespace().peekable();
    let serial = tokens.next()?;
    let state = match tokens.next()? {
        "no" if tokens.peek() == Some(&"permissions") => {
            tokens.next();
            "no permissions"
        }
        other => other,
    };

    let mut device = BridgeDevice::new(serial, BridgeState::from_adb(state));
    for token in tokens {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        match key {
            "model" => device.model = Some(value.to_string()),
            "product" => device.product = Some(value.to_string()),
            "transport_id" => device.transport_id = value.parse().ok(),
            _ => {}
        }
    }

    trace!("Parsed adb device: {} ({})", device.serial, device.state);
    Some(device)
}

fn first_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
        .to_string()
}
