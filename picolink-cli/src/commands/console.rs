//! Interactive line console.
//!
//! Each line typed on stdin is sent to the device as one newline-terminated
//! command. `exit`, end of input or Ctrl-C end the console and close the
//! port.

use anyhow::{Context, Result};
use console::style;
use log::{debug, warn};
use picolink::{Command, CommandFilter, SendError, SessionHandle, SessionWorker};
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::{Cli, clear_interrupted_flag, config::Config, open_session, was_interrupted};

/// How often the main loop checks for Ctrl-C while waiting for input.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What to do with one line of console input.
#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    /// Blank line, nothing to send.
    Skip,
    /// Leave the console.
    Exit,
    /// Not on the allow-list.
    Rejected(String),
    /// Not a valid command.
    Invalid(String),
    /// Send this command.
    Send(Command),
}

fn classify(line: &str, filter: &CommandFilter) -> LineAction {
    let text = line.trim();
    if text.is_empty() {
        return LineAction::Skip;
    }
    if text.eq_ignore_ascii_case("exit") {
        return LineAction::Exit;
    }
    if !filter.accepts(text) {
        return LineAction::Rejected(text.to_string());
    }
    match Command::line(text) {
        Ok(command) => LineAction::Send(command),
        Err(e) => LineAction::Invalid(e.to_string()),
    }
}

/// Run the console.
pub(crate) fn cmd_console(cli: &Cli, config: &mut Config, allow: &[String]) -> Result<()> {
    let filter = if allow.is_empty() {
        CommandFilter::new(&config.console.allowed)
    } else {
        CommandFilter::new(allow)
    };

    let session = open_session(cli, config)?;
    let port = session
        .descriptor()
        .map(|d| d.system_name.clone())
        .unwrap_or_default();
    let worker = SessionWorker::spawn(session).context("Failed to start session worker")?;

    let tty = io::stdin().is_terminal();
    if !cli.quiet {
        eprintln!(
            "{} Console on {} (type {} or press Ctrl-C to quit)",
            style("📡").cyan(),
            style(&port).green(),
            style("exit").bold()
        );
        if filter.is_restricted() {
            eprintln!(
                "{}",
                style(format!("Allowed commands: {}", filter.allowed().join(", "))).dim()
            );
        }
    }

    clear_interrupted_flag();
    let lines = spawn_stdin_reader(tty)?;
    let result = run_loop(&lines, &worker.handle(), &filter, &port);

    worker.shutdown();
    if was_interrupted() {
        clear_interrupted_flag();
    }
    if result.is_ok() && !cli.quiet {
        eprintln!("{} Closed {}", style("👋").cyan(), port);
    }
    result
}

fn run_loop(
    lines: &Receiver<io::Result<String>>,
    handle: &SessionHandle,
    filter: &CommandFilter,
    port: &str,
) -> Result<()> {
    loop {
        if was_interrupted() {
            debug!("Console interrupted");
            return Ok(());
        }

        let line = match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => line.context("Failed to read console input")?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Console input closed");
                return Ok(());
            },
        };

        match classify(&line, filter) {
            LineAction::Skip => {},
            LineAction::Exit => return Ok(()),
            LineAction::Rejected(text) => {
                eprintln!(
                    "{} Command not allowed: {text} (allowed: {})",
                    style("✗").red(),
                    filter.allowed().join(", ")
                );
            },
            LineAction::Invalid(reason) => {
                eprintln!("{} {reason}", style("✗").red());
            },
            LineAction::Send(command) => match handle.send(command.to_bytes()) {
                Ok(()) => debug!("Sent {command:?}"),
                Err(SendError::ShortWrite { written, expected }) => {
                    warn!("Only {written} of {expected} bytes were accepted by {port}");
                },
                Err(e) => return Err(e).with_context(|| format!("Failed to send to {port}")),
            },
        }
    }
}

/// Read stdin lines on a separate thread so the main loop can poll Ctrl-C.
fn spawn_stdin_reader(prompt: bool) -> Result<Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("picolink-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            loop {
                if prompt {
                    eprint!("> ");
                    let _ = io::stderr().flush();
                }
                let mut line = String::new();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    },
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    },
                }
            }
        })
        .context("Failed to start input thread")?;
    Ok(rx)
}
