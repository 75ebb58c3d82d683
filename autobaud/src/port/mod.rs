//! Port abstraction separating the search logic from the OS serial layer.
//!
//! Two collaborators live behind traits so the prober can be driven by the
//! native `serialport` backend or by a test double:
//!
//! - [`PortRegistry`]: read-only query of the ports the OS knows about.
//! - [`SerialTransport`]: opens a [`SerialSession`] on one port at one baud
//!   rate with a hard per-read timeout.
//!
//! ```text
//! +------------------+      +------------------+
//! |  device::enumerate|     |   probe::Prober  |
//! +--------+---------+      +--------+---------+
//!          |                         |
//!          v                         v
//! +--------+---------+      +--------+---------+
//! |  PortRegistry    |      | SerialTransport  |
//! +--------+---------+      +--------+---------+
//!          |                         |
//!          v                         v
//! +--------+---------+      +--------+---------+
//! | NativeRegistry   |      | NativeTransport  |
//! |   (serialport)   |      |   (serialport)   |
//! +------------------+      +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::time::Duration;

use crate::error::Result;

/// Native port descriptor as returned by a [`PortRegistry`].
///
/// Every field except `name` is optional because most platforms only fill in
/// a subset of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// Advertised short name.
    pub display_name: Option<String>,
    /// Human-readable description.
    pub description: Option<String>,
    /// Platform hardware identifier string.
    pub hardware_id: Option<String>,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
    /// Bus location (if available).
    pub location: Option<String>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Interface label (if available).
    pub interface: Option<String>,
}

/// Read-only query of the serial ports present on the host.
pub trait PortRegistry {
    /// List all available serial ports.
    fn list_ports(&self) -> Result<Vec<PortInfo>>;
}

/// One open serial connection at a fixed baud rate.
pub trait SerialSession {
    /// Write all bytes and flush.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Block until a response line arrives or the session timeout elapses.
    ///
    /// The timeout bounds the whole call, not each underlying read. A timeout
    /// with nothing received yields an empty buffer rather than an error.
    fn read_response(&mut self) -> Result<Vec<u8>>;

    /// Close the session and release the OS handle.
    ///
    /// After calling this method, the session cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;
}

/// Factory for [`SerialSession`]s.
pub trait SerialTransport {
    /// Session type produced by this transport.
    type Session: SerialSession;

    /// Open `path` at `baud_rate`; `timeout` bounds each `read_response`.
    fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> Result<Self::Session>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for &T {
    type Session = T::Session;

    fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> Result<Self::Session> {
        (**self).open(path, baud_rate, timeout)
    }
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::{NativePort, NativeRegistry, NativeTransport};
