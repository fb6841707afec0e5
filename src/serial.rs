//! Serial port access for weight indicators.
//!
//! The scale link never talks to `serialport` directly. It goes through two
//! small seams so the read loop can be driven by anything that yields text:
//! - [`PortProvider`]: host capability check + device selection/open
//! - [`ScaleSource`]: one opened device, read chunk by chunk
//!
//! Line parameters are fixed for every indicator we support: 9600 baud,
//! 8 data bits, 1 stop bit, no parity, no flow control.

use serde::Serialize;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ScaleError;

// ---------------------------------------------------------------------------
// Line settings
// ---------------------------------------------------------------------------

/// Fixed serial line parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub stop_bits: serialport::StopBits,
    pub parity: serialport::Parity,
    pub flow_control: serialport::FlowControl,
}

/// The only line configuration indicators are opened with.
pub const SCALE_LINE: LineSettings = LineSettings {
    baud_rate: 9600,
    data_bits: serialport::DataBits::Eight,
    stop_bits: serialport::StopBits::One,
    parity: serialport::Parity::None,
    flow_control: serialport::FlowControl::None,
};

/// How long a single blocking read waits before reporting the line idle.
/// This is a poll interval for cancellation, not a read timeout: an idle
/// scale is never treated as a fault.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Result of one read attempt on an open device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Decoded text, possibly a fragment of a reading.
    Data(String),
    /// Nothing arrived within the poll interval.
    Idle,
    /// The device signalled end-of-data.
    Closed,
}

/// An opened indicator. Dropping it releases the device handle.
pub trait ScaleSource: Send {
    /// Block for at most one poll interval and return what arrived.
    fn read_chunk(&mut self) -> std::io::Result<ReadOutcome>;

    /// Human-readable description of the device.
    fn description(&self) -> String;
}

/// Host serial capability and device selection.
pub trait PortProvider: Send + Sync {
    /// Whether this host offers serial I/O at all.
    fn is_supported(&self) -> bool;

    /// Select a device and open it with `settings`.
    fn open(&self, settings: &LineSettings) -> Result<Box<dyn ScaleSource>, ScaleError>;
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// A serial port visible on this host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub name: String,
    pub port_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

/// List available serial/COM ports on this system.
pub fn list_ports() -> Result<Vec<PortInfo>, ScaleError> {
    let ports = serialport::available_ports()
        .map_err(|e| ScaleError::Open(format!("failed to list ports: {e}")))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    ("usb".to_string(), usb.manufacturer, usb.product)
                }
                serialport::SerialPortType::BluetoothPort => ("bluetooth".to_string(), None, None),
                serialport::SerialPortType::PciPort => ("pci".to_string(), None, None),
                serialport::SerialPortType::Unknown => ("unknown".to_string(), None, None),
            };
            PortInfo {
                name: p.port_name,
                port_type,
                manufacturer,
                product,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// serialport implementation
// ---------------------------------------------------------------------------

/// Opens indicators through the `serialport` crate.
///
/// With no configured port name the first enumerated port is selected.
#[derive(Debug, Clone, Default)]
pub struct SerialPortProvider {
    port_name: Option<String>,
}

impl SerialPortProvider {
    pub fn new(port_name: Option<String>) -> Self {
        Self {
            port_name: port_name.filter(|p| !p.trim().is_empty()),
        }
    }

    fn select_port(&self) -> Result<String, ScaleError> {
        if let Some(name) = &self.port_name {
            return Ok(name.clone());
        }
        let ports = list_ports()?;
        ports
            .into_iter()
            .next()
            .map(|p| p.name)
            .ok_or_else(|| ScaleError::Open("no serial device selected or attached".into()))
    }
}

impl PortProvider for SerialPortProvider {
    fn is_supported(&self) -> bool {
        serialport::available_ports().is_ok()
    }

    fn open(&self, settings: &LineSettings) -> Result<Box<dyn ScaleSource>, ScaleError> {
        let port_name = self.select_port()?;
        let port = serialport::new(port_name.as_str(), settings.baud_rate)
            .data_bits(settings.data_bits)
            .stop_bits(settings.stop_bits)
            .parity(settings.parity)
            .flow_control(settings.flow_control)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| {
                ScaleError::Open(format!("{port_name} @ {}: {e}", settings.baud_rate))
            })?;

        info!(port = %port_name, baud = settings.baud_rate, "Serial port opened");
        Ok(Box::new(SerialSource {
            port_name,
            baud_rate: settings.baud_rate,
            port,
        }))
    }
}

/// An open `serialport` device.
pub struct SerialSource {
    port_name: String,
    baud_rate: u32,
    port: Box<dyn serialport::SerialPort>,
}

impl ScaleSource for SerialSource {
    fn read_chunk(&mut self) -> std::io::Result<ReadOutcome> {
        let mut buf = [0u8; 256];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => {
                // Indicators speak ASCII; anything else is replaced, not fatal.
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                debug!("Serial RX ({n} bytes): {:02X?}", &buf[..n]);
                Ok(ReadOutcome::Data(text))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(ReadOutcome::Idle),
            Err(e) => Err(e),
        }
    }

    fn description(&self) -> String {
        format!("Serial({}@{})", self.port_name, self.baud_rate)
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        info!(port = %self.port_name, "Serial port closed");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
