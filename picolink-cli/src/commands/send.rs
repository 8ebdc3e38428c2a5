//! One-shot `send` and `byte` commands.

use anyhow::{Context, Result};
use console::style;
use picolink::{Command, PortBackend, SerialSession};

use crate::{Cli, CliError, clear_interrupted_flag, config::Config, open_session, was_interrupted};

/// Open the selected port, send one command and close it again.
pub(crate) fn cmd_send(cli: &Cli, config: &mut Config, command: &Command) -> Result<()> {
    let mut session = open_session(cli, config)?;
    let port = session
        .descriptor()
        .map(|d| d.system_name.clone())
        .unwrap_or_default();

    let interrupted = was_interrupted();
    let result = send_once(&mut session, command, interrupted)
        .with_context(|| format!("Failed to send to {port}"));
    session.close();
    if interrupted {
        clear_interrupted_flag();
    }
    result?;

    if !cli.quiet {
        eprintln!(
            "{} Sent {} to {}",
            style("✓").green(),
            style(describe(command)).cyan(),
            port
        );
    }
    Ok(())
}

/// Write `command` unless Ctrl-C arrived while the port was being opened.
fn send_once<B: PortBackend>(
    session: &mut SerialSession<B>,
    command: &Command,
    interrupted: bool,
) -> Result<()> {
    if interrupted {
        return Err(CliError::Cancelled("Send cancelled".to_string()).into());
    }
    session.send(&command.to_bytes())?;
    Ok(())
}

/// Short human-readable form of a command.
fn describe(command: &Command) -> String {
    match command {
        Command::Byte(value) => format!("byte {value} (0x{value:02X})"),
        Command::Line(text) => format!("{text:?}"),
    }
}
