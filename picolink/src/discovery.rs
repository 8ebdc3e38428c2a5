//! Serial port discovery and classification.
//!
//! Every call re-queries the backend; nothing is cached. Ports are flagged as
//! likely microcontroller targets by a name heuristic, which is a convenience
//! for picking a default and never a requirement for opening a port by name.

use {
    crate::port::{PortBackend, PortInfo, PortKind},
    log::{debug, trace},
};

/// Substrings (lower-case) that mark a port as a likely target.
const TARGET_HINTS: &[&str] = &["pico", "usb", "ttyacm"];

/// Raspberry Pi Foundation USB vendor ID (RP2040/RP2350 boards).
const RASPBERRY_PI_VID: u16 = 0x2E8A;

/// Known USB VID/PID pairs for common USB-to-UART bridges.
const KNOWN_USB_BRIDGES: &[(u16, &[u16], DeviceKind)] = &[
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], DeviceKind::Cp210x),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        DeviceKind::Ftdi,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], DeviceKind::Prolific),
];

/// USB device classification derived from VID/PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// Raspberry Pi board with native USB CDC (Pico and friends).
    RaspberryPi,
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Unknown device.
    #[default]
    Unknown,
}

impl DeviceKind {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        if vid == RASPBERRY_PI_VID {
            return Self::RaspberryPi;
        }
        for (known_vid, pids, device) in KNOWN_USB_BRIDGES {
            if vid == *known_vid && pids.contains(&pid) {
                return *device;
            }
        }
        Self::Unknown
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RaspberryPi => "Raspberry Pi",
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known device kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Snapshot of one serial port at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortDescriptor {
    /// OS name of the port ("COM5", "/dev/ttyACM0"). Unique at a point in time.
    pub system_name: String,
    /// Human-readable description.
    pub descriptive_name: String,
    /// Whether the name heuristic flags this as a likely target board.
    pub is_likely_target: bool,
    /// Classified USB device kind.
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

impl PortDescriptor {
    /// Build a descriptor from raw backend information.
    pub fn from_info(info: PortInfo) -> Self {
        let descriptive_name = descriptive_name(&info);
        let is_likely_target = is_likely_target(&info.name, &descriptive_name);
        let device = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => DeviceKind::from_vid_pid(vid, pid),
            _ => DeviceKind::Unknown,
        };

        Self {
            system_name: info.name,
            descriptive_name,
            is_likely_target,
            device,
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial_number: info.serial_number,
        }
    }

    /// Descriptor for a port known only by name.
    pub fn from_name(system_name: impl Into<String>) -> Self {
        Self::from_info(PortInfo {
            name: system_name.into(),
            ..PortInfo::default()
        })
    }
}

/// Check whether a port looks like a microcontroller board.
///
/// True when either name contains "pico", "usb" or "ttyacm", ignoring case.
pub fn is_likely_target(system_name: &str, descriptive_name: &str) -> bool {
    let system_name = system_name.to_lowercase();
    let descriptive_name = descriptive_name.to_lowercase();
    TARGET_HINTS
        .iter()
        .any(|hint| system_name.contains(hint) || descriptive_name.contains(hint))
}

fn descriptive_name(info: &PortInfo) -> String {
    match info.kind {
        PortKind::Usb => info
            .product
            .clone()
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| "USB Serial Device".to_string(), |p| format!("{p} (USB)")),
        PortKind::Bluetooth => "Bluetooth Serial Port".to_string(),
        PortKind::Pci => "PCI Serial Port".to_string(),
        PortKind::Unknown => "Serial Port".to_string(),
    }
}

/// Iterator over the ports found by one discovery pass.
///
/// Descriptors are built as the iterator is advanced. Call
/// [`discover_with`] again for a fresh view of the system.
#[derive(Debug)]
pub struct Discovery {
    inner: std::vec::IntoIter<PortInfo>,
}

impl Iterator for Discovery {
    type Item = PortDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(PortDescriptor::from_info)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Discovery {}

/// Discover ports through a specific backend.
///
/// Enumeration failures are logged and yield an empty sequence.
pub fn discover_with<B: PortBackend + ?Sized>(backend: &B) -> Discovery {
    let ports = match backend.list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    };
    trace!("Enumerated {} serial port(s)", ports.len());

    Discovery {
        inner: ports.into_iter(),
    }
}

/// Discover all serial ports visible to the OS.
#[cfg(feature = "native")]
pub fn discover() -> Discovery {
    discover_with(&crate::port::NativeBackend)
}

/// Which port to use when the caller did not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultSelection {
    /// First likely target, else the first enumerated port.
    #[default]
    FirstLikelyTarget,
    /// First enumerated port, regardless of the heuristic.
    FirstPort,
}

impl DefaultSelection {
    /// Index of the port this policy picks, or `None` for an empty list.
    pub fn pick(self, ports: &[PortDescriptor]) -> Option<usize> {
        if ports.is_empty() {
            return None;
        }
        match self {
            Self::FirstLikelyTarget => Some(
                ports
                    .iter()
                    .position(|p| p.is_likely_target)
                    .unwrap_or(0),
            ),
            Self::FirstPort => Some(0),
        }
    }
}

/// Format a list of descriptors for display.
///
/// Likely targets end with ` *`.
pub fn format_port_list(ports: &[PortDescriptor]) -> Vec<String> {
    format_port_list_with(ports, |port| port.is_likely_target)
}

/// Format a list of descriptors, marking the ports `is_target` accepts.
pub fn format_port_list_with<F>(ports: &[PortDescriptor], is_target: F) -> Vec<String>
where
    F: Fn(&PortDescriptor) -> bool,
{
    ports
        .iter()
        .map(|port| {
            let device_info = if port.device.is_known() {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };
            let marker = if is_target(port) { " *" } else { "" };

            format!(
                "{} - {}{}{}",
                port.system_name, port.descriptive_name, device_info, marker
            )
        })
        .collect()
}
