//! Port abstraction for serial communication.
//!
//! The session logic only talks to the [`Port`] and [`PortBackend`] traits,
//! so the OS-facing part can be swapped out:
//!
//! ```text
//! +------------------+
//! |  SerialSession   |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! | PortBackend/Port |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  NativeBackend   |
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use picolink::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> std::io::Result<()> {
//!     port.write_all(b"on\n")?;
//!     port.flush()
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::Write;
use std::time::Duration;

use crate::error::{OpenError, Result};

/// Timeout used for writes that should block until the OS accepts them.
///
/// Large enough to never expire in practice while still fitting the
/// millisecond counters some platforms store timeouts in.
pub const UNBOUNDED_TIMEOUT: Duration = Duration::from_millis(0xFFFF_FFFE);

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM5").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Write timeout.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: UNBOUNDED_TIMEOUT,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of data bits.
    #[must_use]
    pub fn with_data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    /// Set the parity mode.
    #[must_use]
    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the number of stop bits.
    #[must_use]
    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    /// Set the flow control mode.
    #[must_use]
    pub fn with_flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// How the OS exposes a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortKind {
    /// USB serial device (CDC-ACM or USB-UART bridge).
    Usb,
    /// Bluetooth serial link.
    Bluetooth,
    /// PCI serial card.
    Pci,
    /// Anything else (built-in UARTs, virtual ports).
    #[default]
    Unknown,
}

/// Raw serial port information as reported by a backend.
#[derive(Debug, Clone, Default)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// Port type.
    pub kind: PortKind,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// An open serial port handle.
///
/// Dropping the value releases the OS handle.
pub trait Port: Write + Send {
    /// Set the write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Get the configured baud rate.
    fn baud_rate(&self) -> u32;

    /// Get the port name/path.
    fn name(&self) -> &str;
}

/// Enumerates and opens serial ports.
pub trait PortBackend {
    /// Handle type returned by [`PortBackend::open`].
    type Port: Port;

    /// List all serial ports currently visible.
    fn list_ports(&self) -> Result<Vec<PortInfo>>;

    /// Open and configure a port.
    ///
    /// A device that does not exist maps to [`OpenError::NotFound`], any other
    /// refusal to [`OpenError::OsRejected`].
    fn open(&self, config: &SerialConfig) -> std::result::Result<Self::Port, OpenError>;
}

#[cfg(feature = "native")]
pub use native::{NativeBackend, NativePort};
