//! # picolink
//!
//! Serial port session management for talking to microcontroller boards
//! such as the Raspberry Pi Pico.
//!
//! This crate covers the host side of simple command links:
//!
//! - Serial port discovery with a "likely target" heuristic
//! - A [`SerialSession`] that opens, writes to and closes one port
//! - Helpers for single-byte and newline-terminated text commands
//! - A worker thread that serializes writes from several producers
//!
//! There is no protocol beyond raw bytes: no framing, acknowledgments or
//! retries.
//!
//! ## Features
//!
//! - `native` (default): OS serial ports via the `serialport` crate
//! - `serde`: Serialization support for discovery types
//!
//! ## Example
//!
//! ```rust,no_run
//! use picolink::{Command, DefaultSelection, SerialSession, discover};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ports: Vec<_> = discover().collect();
//!     let Some(index) = DefaultSelection::FirstLikelyTarget.pick(&ports) else {
//!         return Err("no serial ports".into());
//!     };
//!
//!     let mut session = SerialSession::new();
//!     session.open(&ports[index], 115200)?;
//!     session.send(&Command::line("on")?.to_bytes())?;
//!     session.close();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod discovery;
pub mod error;
pub mod port;
pub mod session;
pub mod worker;

#[cfg(feature = "native")]
pub use discovery::discover;
#[cfg(feature = "native")]
pub use port::{NativeBackend, NativePort};
#[cfg(feature = "native")]
pub use session::NativeSession;
pub use {
    command::{Command, CommandFilter},
    discovery::{
        DefaultSelection, DeviceKind, Discovery, PortDescriptor, discover_with, format_port_list,
        format_port_list_with, is_likely_target,
    },
    error::{Error, OpenError, Result, SendError},
    port::{Port, PortBackend, PortInfo, PortKind, SerialConfig},
    session::{PortSelector, SerialSession, WritePolicy},
    worker::{SessionHandle, SessionWorker},
};
