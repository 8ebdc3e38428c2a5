//! Configuration file support for picolink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (PICOLINK_*)
//! 3. Local config file (./picolink.toml)
//! 4. Global config file (~/.config/picolink/config.toml)

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "picolink.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM5").
    pub port: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
    /// Write timeout in milliseconds (absent means block until accepted).
    pub write_timeout_ms: Option<u64>,
    /// Extra USB devices treated as likely targets during selection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

/// Interactive console configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Commands the console may send; empty allows everything.
    #[serde(default)]
    pub allowed: Vec<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Console configuration.
    #[serde(default)]
    pub console: ConsoleConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "picolink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.connection.write_timeout_ms.is_some() {
            self.connection.write_timeout_ms = other.connection.write_timeout_ms;
        }
        self.connection.usb_device.extend(other.connection.usb_device);

        if !other.console.allowed.is_empty() {
            self.console.allowed = other.console.allowed;
        }
    }

    /// Check whether a VID/PID pair was configured as a target device.
    pub fn is_configured_device(&self, vid: Option<u16>, pid: Option<u16>) -> bool {
        match (vid, pid) {
            (Some(vid), Some(pid)) => self
                .connection
                .usb_device
                .iter()
                .any(|d| d.matches(vid, pid)),
            _ => false,
        }
    }

    /// Remember a selected port in the local config file.
    pub fn remember_port(
        &mut self,
        port: &str,
        vid: Option<u16>,
        pid: Option<u16>,
    ) -> anyhow::Result<PathBuf> {
        self.remember_port_in(Path::new(LOCAL_CONFIG_FILE), port, vid, pid)
    }

    fn remember_port_in(
        &mut self,
        path: &Path,
        port: &str,
        vid: Option<u16>,
        pid: Option<u16>,
    ) -> anyhow::Result<PathBuf> {
        // Only the local file is rewritten; keep its other settings.
        let mut local = Self::load_from_file(path).unwrap_or_default();
        local.connection.port = Some(port.to_string());
        self.connection.port = Some(port.to_string());

        if let (Some(vid), Some(pid)) = (vid, pid) {
            let device = UsbDevice { vid, pid };
            if !local.connection.usb_device.contains(&device) {
                local.connection.usb_device.push(device.clone());
            }
            if !self.connection.usb_device.contains(&device) {
                self.connection.usb_device.push(device);
            }
        }

        let content = toml::to_string_pretty(&local)?;
        fs::write(path, content)?;
        info!("Saved port configuration to {}", path.display());

        Ok(path.to_path_buf())
    }
}
