//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the backend for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, OpenError, Result},
        port::{
            DataBits, FlowControl, Parity, Port, PortBackend, PortInfo, PortKind, SerialConfig,
            StopBits,
        },
    },
    log::trace,
    std::{io::Write, time::Duration},
};

/// Native serial port handle.
pub struct NativePort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    timeout: Duration,
    baud_rate: u32,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(config.data_bits.into())
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .open()?;

        Ok(Self {
            port,
            name: config.port_name.clone(),
            timeout: config.timeout,
            baud_rate: config.baud_rate,
        })
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

/// Backend that talks to the operating system's serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl PortBackend for NativeBackend {
    type Port = NativePort;

    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let mut info = PortInfo {
                    name: p.port_name,
                    ..PortInfo::default()
                };

                match p.port_type {
                    serialport::SerialPortType::UsbPort(usb) => {
                        trace!(
                            "Found USB port: {} (VID: {:04X}, PID: {:04X})",
                            info.name, usb.vid, usb.pid
                        );
                        info.kind = PortKind::Usb;
                        info.vid = Some(usb.vid);
                        info.pid = Some(usb.pid);
                        info.manufacturer = usb.manufacturer;
                        info.product = usb.product;
                        info.serial_number = usb.serial_number;
                    },
                    serialport::SerialPortType::BluetoothPort => info.kind = PortKind::Bluetooth,
                    serialport::SerialPortType::PciPort => info.kind = PortKind::Pci,
                    serialport::SerialPortType::Unknown => {},
                }

                info
            })
            .collect())
    }

    fn open(&self, config: &SerialConfig) -> std::result::Result<NativePort, OpenError> {
        NativePort::open(config).map_err(|e| match e {
            Error::Serial(ref err) if err.kind() == serialport::ErrorKind::NoDevice => {
                OpenError::NotFound(config.port_name.clone())
            },
            Error::Serial(ref err)
                if err.kind() == serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) =>
            {
                OpenError::NotFound(config.port_name.clone())
            },
            other => OpenError::OsRejected {
                port: config.port_name.clone(),
                reason: other.to_string(),
            },
        })
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => Self::Five,
            DataBits::Six => Self::Six,
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}
