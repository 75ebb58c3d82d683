//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the registry and transport for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result},
        port::{PortInfo, PortRegistry, SerialSession, SerialTransport},
    },
    log::trace,
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits},
    std::{
        io::{ErrorKind, Read, Write},
        path::Path,
        time::{Duration, Instant},
    },
};

/// Upper bound on bytes collected by a single [`NativePort::read_response`].
const MAX_RESPONSE_LEN: usize = 256;

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    timeout: Duration,
}

impl NativePort {
    /// Open `path` at `baud_rate` with 8N1 framing and no flow control.
    ///
    /// `timeout` bounds each [`SerialSession::read_response`] call.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()?;

        trace!("Opened {path} at {baud_rate}");
        Ok(Self::from_handle(port, path, timeout))
    }

    fn from_handle(port: Box<dyn SerialPort>, name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            port: Some(port),
            name: name.into(),
            timeout,
        }
    }

    /// Discard anything left in the driver's input and output buffers.
    pub fn clear_buffers(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::Transport(format!("{} is closed", self.name)))
    }
}

impl SerialSession for NativePort {
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(buf)?;
        port.flush()?;
        Ok(())
    }

    fn read_response(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let port = self.port_mut()?;
        let mut response = Vec::new();
        let mut buf = [0u8; 64];

        while response.len() < MAX_RESPONSE_LEN {
            // One deadline for the whole line, however the bytes trickle in
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            port.set_timeout(remaining)?;

            let want = buf.len().min(MAX_RESPONSE_LEN - response.len());
            match port.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&buf[..n]);
                    if buf[..n].contains(&b'\n') {
                        break;
                    }
                },
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }

        Ok(response)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the boxed port releases the OS handle
        if self.port.take().is_some() {
            trace!("Closed {}", self.name);
        }
        Ok(())
    }
}

/// Transport that opens [`NativePort`]s with 8N1 framing and no flow control.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTransport;

impl SerialTransport for NativeTransport {
    type Session = NativePort;

    fn open(&self, path: &str, baud_rate: u32, timeout: Duration) -> Result<NativePort> {
        let mut port = NativePort::open(path, baud_rate, timeout)?;
        port.clear_buffers()?;
        Ok(port)
    }
}

/// Port registry backed by `serialport::available_ports`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRegistry;

impl PortRegistry for NativeRegistry {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports =
            serialport::available_ports().map_err(|e| Error::Enumeration(e.to_string()))?;

        Ok(ports.into_iter().map(port_info_from_native).collect())
    }
}

fn port_info_from_native(p: serialport::SerialPortInfo) -> PortInfo {
    let display_name = Path::new(&p.port_name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);

    let mut info = PortInfo {
        name: p.port_name,
        display_name,
        ..PortInfo::default()
    };

    match p.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            info.hardware_id = Some(usb_hardware_id(usb.vid, usb.pid, usb.serial_number.as_deref()));
            info.vid = Some(usb.vid);
            info.pid = Some(usb.pid);
            info.serial_number = usb.serial_number;
            info.manufacturer = usb.manufacturer;
            info.description.clone_from(&usb.product);
            info.product = usb.product;
        },
        serialport::SerialPortType::PciPort => info.hardware_id = Some("PCI".to_string()),
        serialport::SerialPortType::BluetoothPort => {
            info.hardware_id = Some("BLUETOOTH".to_string());
        },
        serialport::SerialPortType::Unknown => {},
    }

    if info.description.is_none() {
        info.description.clone_from(&info.display_name);
    }

    trace!(
        "Found port: {} (VID: {:?}, PID: {:?}, manufacturer: {:?})",
        info.name, info.vid, info.pid, info.manufacturer
    );

    info
}

/// Hardware id in the familiar `USB VID:PID=1A86:7523 SER=...` form.
fn usb_hardware_id(vid: u16, pid: u16, serial: Option<&str>) -> String {
    match serial {
        Some(ser) => format!("USB VID:PID={vid:04X}:{pid:04X} SER={ser}"),
        None => format!("USB VID:PID={vid:04X}:{pid:04X}"),
    }
}
