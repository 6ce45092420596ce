//! Serial device access for the scale.
//!
//! [`Device`] is the seam between the supervisor's state machine and the
//! physical port, so the lifecycle can be driven by a scripted fake in tests.
//! [`SerialDevice`] is the real implementation on top of the `serialport` crate.

pub mod supervisor;

pub use supervisor::{Shutdown, Supervisor};

use serialport::{DataBits, Parity as SpParity, SerialPort, StopBits};
use std::io::{self, Read};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Default timeout for a single blocking read.
///
/// Bounds how long the supervisor waits before it checks for shutdown again.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Byte stream of an open device.
pub type DeviceStream = Box<dyn Read + Send>;

/// Errors raised by the device while opening or reading.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Device absent, busy, or inaccessible at open time
    #[error("Failed to open {device}: {reason}")]
    Open { device: String, reason: String },
    /// I/O failure on an already open handle
    #[error("I/O error on {device}: {source}")]
    Runtime {
        device: String,
        #[source]
        source: io::Error,
    },
}

/// A source of scale bytes that can be (re)opened any number of times.
pub trait Device: Send {
    /// Identifier used in log output (e.g. "/dev/ttyUSB0").
    fn name(&self) -> &str;

    /// Open the device, returning its byte stream.
    ///
    /// Reads on the returned stream should time out periodically with
    /// `ErrorKind::TimedOut` rather than block forever.
    fn open(&mut self) -> Result<DeviceStream, DeviceError>;
}

/// Parity setting for the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parity::None => write!(f, "none"),
            Parity::Odd => write!(f, "odd"),
            Parity::Even => write!(f, "even"),
        }
    }
}

/// Serial line configuration for one deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub read_timeout: Duration,
}

/// Convert our Parity enum to the serialport crate's Parity type
fn to_serialport_parity(p: Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Convert a data bits count to the serialport crate's DataBits type
fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert a stop bits count to the serialport crate's StopBits type
fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Render line settings in the usual "9600 7-E-2" notation.
fn line_settings(
    baud_rate: u32,
    data_bits: DataBits,
    parity: SpParity,
    stop_bits: StopBits,
) -> String {
    let data_bits = match data_bits {
        DataBits::Five => 5,
        DataBits::Six => 6,
        DataBits::Seven => 7,
        DataBits::Eight => 8,
    };
    let parity = match parity {
        SpParity::None => 'N',
        SpParity::Odd => 'O',
        SpParity::Even => 'E',
    };
    let stop_bits = match stop_bits {
        StopBits::One => 1,
        StopBits::Two => 2,
    };
    format!("{baud_rate} {data_bits}-{parity}-{stop_bits}")
}

/// Scale attached to a local serial port.
#[derive(Debug, Clone)]
pub struct SerialDevice {
    settings: SerialSettings,
}

impl SerialDevice {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

/// Adapter exposing an open port as a plain byte stream.
struct SerialStream(Box<dyn SerialPort>);

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Device for SerialDevice {
    fn name(&self) -> &str {
        &self.settings.path
    }

    fn open(&mut self) -> Result<DeviceStream, DeviceError> {
        let s = &self.settings;
        let data_bits = to_serialport_data_bits(s.data_bits);
        let parity = to_serialport_parity(s.parity);
        let stop_bits = to_serialport_stop_bits(s.stop_bits);

        let port = serialport::new(&s.path, s.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(s.read_timeout)
            .open()
            .map_err(|e| DeviceError::Open {
                device: s.path.clone(),
                reason: e.to_string(),
            })?;

        // Report what the driver actually applied, falling back to the request
        // where the platform cannot read a setting back.
        let achieved = line_settings(
            port.baud_rate().unwrap_or(s.baud_rate),
            port.data_bits().unwrap_or(data_bits),
            port.parity().unwrap_or(parity),
            port.stop_bits().unwrap_or(stop_bits),
        );
        info!(device = %s.path, settings = %achieved, "serial port open");

        Ok(Box::new(SerialStream(port)))
    }
}
