//! # autobaud
//!
//! Find which attached serial device answers, and at what baud rate, without
//! knowing the device's configured speed in advance.
//!
//! The crate is split along the search pipeline:
//!
//! - [`device`]: enumerate ports into [`DeviceRecord`]s and filter them by
//!   manufacturer
//! - [`probe`]: try every (port, baud rate) candidate with a one-shot
//!   handshake and stop at the first readable reply
//! - [`report`]: render device lists and outcomes as text
//! - [`port`]: registry/transport traits and the native `serialport` backend
//!
//! ## Features
//!
//! - `native` (default): Native serial port support via the `serialport` crate
//! - `serde`: `Serialize` for [`DeviceRecord`] and [`ConnectionOutcome`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use autobaud::{CancelToken, ConnectionOutcome, ProbeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let outcome =
//!             autobaud::auto_connect(&["wch.cn"], ProbeConfig::default(), CancelToken::new())?;
//!
//!         if let ConnectionOutcome::Connected { port, baud_rate } = outcome {
//!             println!("{port} @ {baud_rate}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
#[cfg(feature = "native")]
pub mod host;
pub mod port;
pub mod probe;
pub mod report;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker consulted between probe attempts.
///
/// The checker should return `true` when the current search should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(feature = "native")]
pub use {
    host::{auto_connect, discover_ports, discover_vendor_ports},
    port::{NativePort, NativeRegistry, NativeTransport},
};
pub use {
    device::{DEFAULT_ALLOWED_MANUFACTURERS, DeviceRecord, enumerate, filter_by_vendor},
    error::{Error, Result},
    port::{PortInfo, PortRegistry, SerialSession, SerialTransport},
    probe::{
        AttemptResult, CancelToken, CandidateSet, ConnectionOutcome, DEFAULT_BAUD_RATES,
        DEFAULT_HANDSHAKE_TIMEOUT, HANDSHAKE_COMMAND, ProbeConfig, Prober, RejectReason,
    },
    report::{describe_devices, describe_outcome},
};
