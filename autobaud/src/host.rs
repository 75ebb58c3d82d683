//! Host-side shortcuts wiring the native registry and transport together.

use log::info;

use crate::{
    device::{self, DeviceRecord},
    error::Result,
    port::{NativeRegistry, NativeTransport},
    probe::{CancelToken, ConnectionOutcome, ProbeConfig, Prober},
    report,
};

/// Discover all available serial ports.
pub fn discover_ports() -> Result<Vec<DeviceRecord>> {
    device::enumerate(&NativeRegistry)
}

/// Discover serial ports whose manufacturer is in `allowed`.
pub fn discover_vendor_ports<S: AsRef<str>>(allowed: &[S]) -> Result<Vec<DeviceRecord>> {
    Ok(device::filter_by_vendor(discover_ports()?, allowed))
}

/// Enumerate, filter, log the device list, then probe.
///
/// `cancel` is checked between candidate attempts.
pub fn auto_connect<S: AsRef<str>>(
    allowed: &[S],
    config: ProbeConfig,
    cancel: CancelToken,
) -> Result<ConnectionOutcome> {
    let devices = discover_vendor_ports(allowed)?;
    info!("{}", report::describe_devices(&devices));

    let outcome = Prober::new(NativeTransport, config)
        .with_cancel_token(cancel)
        .probe(&devices)?;
    info!("{}", report::describe_outcome(&outcome));

    Ok(outcome)
}
