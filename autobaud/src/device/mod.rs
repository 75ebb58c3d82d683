//! Device discovery and vendor filtering.
//!
//! Enumeration turns whatever the [`PortRegistry`] reports into
//! [`DeviceRecord`]s; filtering narrows them to the manufacturers the caller
//! is willing to probe.

use crate::{
    error::Result,
    port::{PortInfo, PortRegistry},
};

use log::{debug, trace};

/// Manufacturers probed when the caller does not supply an allow-list.
pub const DEFAULT_ALLOWED_MANUFACTURERS: &[&str] = &["wch.cn"];

/// One discovered serial endpoint.
///
/// Records are snapshots: every [`enumerate`] call builds new ones. Two
/// records with the same `path` describe the same port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceRecord {
    /// OS device identifier (e.g., "/dev/ttyUSB0" or "COM3"). Never empty.
    pub path: String,
    /// Short name, usually the basename of `path`.
    pub display_name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Platform hardware id.
    pub hardware_id: Option<String>,
    /// USB Vendor ID (if available).
    pub vendor_id: Option<u16>,
    /// USB Product ID (if available).
    pub product_id: Option<u16>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
    /// Bus location (if available).
    pub location: Option<String>,
    /// Manufacturer string, used as the filter key.
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Interface label (if available).
    pub interface: Option<String>,
}

impl DeviceRecord {
    /// Build a record with only a path; all metadata empty.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            display_name: path.clone(),
            path,
            description: None,
            hardware_id: None,
            vendor_id: None,
            product_id: None,
            serial_number: None,
            location: None,
            manufacturer: None,
            product: None,
            interface: None,
        }
    }

    /// Set the manufacturer string.
    #[must_use]
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Whether `manufacturer` exactly matches one of `names`.
    pub fn manufacturer_in<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.manufacturer
            .as_deref()
            .is_some_and(|m| names.iter().any(|n| n.as_ref() == m))
    }

    /// Convert a native descriptor. Returns `None` for descriptors without a path.
    pub fn from_port_info(info: PortInfo) -> Option<Self> {
        if info.name.is_empty() {
            return None;
        }

        let display_name = info
            .display_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| info.name.clone());

        Some(Self {
            path: info.name,
            display_name,
            description: info.description,
            hardware_id: info.hardware_id,
            vendor_id: info.vid,
            product_id: info.pid,
            serial_number: info.serial_number,
            location: info.location,
            manufacturer: info.manufacturer,
            product: info.product,
            interface: info.interface,
        })
    }
}

/// Query `registry` and build a record for every port with a non-empty path.
///
/// An empty list means no ports are present; only a failing registry query
/// is an error.
pub fn enumerate<R: PortRegistry + ?Sized>(registry: &R) -> Result<Vec<DeviceRecord>> {
    let ports = registry.list_ports()?;
    debug!("Port registry reported {} port(s)", ports.len());

    let records: Vec<DeviceRecord> = ports
        .into_iter()
        .filter_map(|info| {
            trace!("Inspecting port: {}", info.name);
            DeviceRecord::from_port_info(info)
        })
        .collect();

    Ok(records)
}

/// Keep records whose manufacturer exactly matches an entry of `allowed`.
///
/// Relative order of the input is preserved.
pub fn filter_by_vendor<S: AsRef<str>>(records: Vec<DeviceRecord>, allowed: &[S]) -> Vec<DeviceRecord> {
    records
        .into_iter()
        .filter(|r| r.manufacturer_in(allowed))
        .collect()
}

/// Enumerate native ports (requires the `native` feature).
#[cfg(feature = "native")]
pub fn enumerate_native() -> Result<Vec<DeviceRecord>> {
    enumerate(&crate::port::NativeRegistry)
}
