//! Port listing command implementation.

use {
    anyhow::{Context, Result},
    autobaud::{DeviceRecord, NativeRegistry, describe_devices, enumerate, filter_by_vendor},
    console::style,
};

/// List ports command implementation.
pub(crate) fn cmd_list_ports(allowed: &[String], all: bool, json: bool) -> Result<()> {
    let devices = enumerate(&NativeRegistry).context("Failed to enumerate serial ports")?;
    let devices = if all {
        devices
    } else {
        filter_by_vendor(devices, allowed)
    };

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": devices,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_devices(&devices, all, allowed);
    Ok(())
}

/// Print the device report to stderr with a styled header.
fn print_devices(devices: &[DeviceRecord], all: bool, allowed: &[String]) {
    let header = if all {
        "Serial ports".to_string()
    } else {
        format!("Serial ports from {}", allowed.join(", "))
    };
    eprintln!("{}", style(header).bold().underlined());

    if devices.is_empty() {
        eprintln!("  {}", style(describe_devices(devices)).dim());
        return;
    }

    for line in describe_devices(devices).lines().skip(1) {
        if let Some(path) = line.strip_prefix("Device: ") {
            eprintln!("{} {}", style("•").green(), style(path).cyan().bold());
        } else {
            eprintln!("{line}");
        }
    }
}
