//! Plain-text rendering of enumeration and probe results.
//!
//! Nothing here makes decisions; the output is handed to a logger or printed
//! by the CLI.

use std::fmt::{self, Write as _};

use crate::{device::DeviceRecord, probe::ConnectionOutcome};

const UNKNOWN: &str = "None";

fn field(value: Option<&str>) -> &str {
    value.unwrap_or(UNKNOWN)
}

fn id_field(value: Option<u16>) -> String {
    value.map_or_else(|| UNKNOWN.to_string(), |v| format!("{v:04X}"))
}

/// Multi-line description of one device.
pub fn describe_device(device: &DeviceRecord) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "Device: {}", device.path);
    let _ = writeln!(out, "  Name: {}", device.display_name);
    let _ = writeln!(out, "  Description: {}", field(device.description.as_deref()));
    let _ = writeln!(out, "  HWID: {}", field(device.hardware_id.as_deref()));
    let _ = writeln!(out, "  VID: {}", id_field(device.vendor_id));
    let _ = writeln!(out, "  PID: {}", id_field(device.product_id));
    let _ = writeln!(out, "  Serial Number: {}", field(device.serial_number.as_deref()));
    let _ = writeln!(out, "  Location: {}", field(device.location.as_deref()));
    let _ = writeln!(out, "  Manufacturer: {}", field(device.manufacturer.as_deref()));
    let _ = writeln!(out, "  Product: {}", field(device.product.as_deref()));
    let _ = writeln!(out, "  Interface: {}", field(device.interface.as_deref()));
    out
}

/// Description of every device, or a single line when there are none.
pub fn describe_devices(devices: &[DeviceRecord]) -> String {
    if devices.is_empty() {
        return "No devices connected.".to_string();
    }

    let mut out = String::from("Connected Devices:\n");
    for device in devices {
        out.push_str(&describe_device(device));
    }
    out
}

/// One-line description of a probe outcome.
pub fn describe_outcome(outcome: &ConnectionOutcome) -> String {
    outcome.to_string()
}

impl fmt::Display for ConnectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { port, baud_rate } => {
                write!(f, "Connected to {port} at {baud_rate} baud")
            },
            Self::NotFound => write!(f, "Couldn't connect to any device"),
        }
    }
}
