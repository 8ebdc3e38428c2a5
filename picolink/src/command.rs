//! Command payloads understood by simple microcontroller firmware.
//!
//! Two shapes are in use: a single raw byte (a brightness or speed value) and
//! a text command terminated by one `\n`. The session itself never adds
//! framing; these helpers build the bytes before they are handed to
//! [`crate::SerialSession::send`].

use crate::error::{Error, Result};

/// A command to send to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Single raw byte.
    Byte(u8),
    /// Text command, sent with a trailing newline.
    Line(String),
}

impl Command {
    /// Build a text command from user input.
    ///
    /// Trailing `\r`/`\n` characters are stripped; the command itself may not
    /// be empty or contain a line break.
    pub fn line(text: &str) -> Result<Self> {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            return Err(Error::InvalidCommand("empty command".to_string()));
        }
        if text.contains(['\r', '\n']) {
            return Err(Error::InvalidCommand(format!(
                "command contains a line break: {text:?}"
            )));
        }
        Ok(Self::Line(text.to_string()))
    }

    /// Build a raw byte command from a value in 0..=255.
    pub fn byte(value: u32) -> Result<Self> {
        u8::try_from(value)
            .map(Self::Byte)
            .map_err(|_| Error::InvalidCommand(format!("byte value out of range: {value}")))
    }

    /// Encode the command as it goes on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Byte(value) => vec![*value],
            Self::Line(text) => {
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(b'\n');
                bytes
            },
        }
    }
}

/// Optional allow-list for console input.
#[derive(Debug, Clone, Default)]
pub struct CommandFilter {
    allowed: Vec<String>,
}

impl CommandFilter {
    /// Filter accepting only the given commands (case-insensitive).
    ///
    /// An empty list accepts everything.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Whether `text` may be sent.
    pub fn accepts(&self, text: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&text.trim().to_lowercase())
    }

    /// Whether any restriction is configured.
    pub fn is_restricted(&self) -> bool {
        !self.allowed.is_empty()
    }

    /// The allowed commands, lower-cased.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}
