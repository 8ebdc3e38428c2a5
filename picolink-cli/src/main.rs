//! picolink CLI - send commands to microcontroller boards over serial.
//!
//! ## Features
//!
//! - List serial ports and spot likely boards
//! - Send a single text command or raw byte
//! - Interactive line console
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use picolink::{Command, NativeSession, SerialSession, WritePolicy};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Baud rate used when neither the CLI nor the config names one.
const DEFAULT_BAUD: u32 = 115200;

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Whether Ctrl-C was pressed since the last check.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Reset the interrupt flag.
pub(crate) fn clear_interrupted_flag() {
    INTERRUPTED.store(false, Ordering::Relaxed);
}

/// picolink - send commands to microcontroller boards over serial.
///
/// Environment variables:
///   PICOLINK_PORT              - Default serial port
///   PICOLINK_BAUD              - Default baud rate (default: 115200)
///   PICOLINK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "picolink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "PICOLINK_PORT")]
    port: Option<String>,

    /// Use the port at this position in `picolink list-ports`.
    #[arg(long, global = true, conflicts_with = "port")]
    index: Option<usize>,

    /// Baud rate (default: 115200).
    #[arg(short, long, global = true, env = "PICOLINK_BAUD")]
    baud: Option<u32>,

    /// Give up on a write after this many milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    write_timeout: Option<u64>,

    /// Never wait for the OS to accept written bytes.
    #[arg(long, global = true, conflicts_with = "write_timeout")]
    non_blocking: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (never prompt).
    #[arg(long, global = true, env = "PICOLINK_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Consider all ports during auto-selection, not only likely boards.
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Send one newline-terminated text command.
    ///
    /// Ctrl-C before the write cancels it and closes the port; a second
    /// Ctrl-C exits immediately.
    Send {
        /// Command text (a trailing newline is added).
        text: String,
    },

    /// Send one raw byte.
    ///
    /// Ctrl-C before the write cancels it and closes the port; a second
    /// Ctrl-C exits immediately.
    Byte {
        /// Value 0-255, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_byte, value_name = "VALUE")]
        value: Command,
    },

    /// Relay typed lines to the device until `exit`, EOF or Ctrl-C.
    Console {
        /// Only allow these commands (repeatable, case-insensitive).
        #[arg(long = "allow", value_name = "CMD")]
        allow: Vec<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL if omitted).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

/// CLI failure classes that map to specific exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or environment (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        Some(CliError::Cancelled(_)) => 130,
        None => 1,
    }
}

/// Parse a byte command (supports decimal and 0x-prefixed hex).
fn parse_byte(s: &str) -> Result<Command, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    };
    let value = parsed.map_err(|e| format!("Invalid byte value '{s}' (expected 0-255): {e}"))?;
    Command::byte(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Baud rate from CLI, then config, then the default.
    fn baud_rate(&self, config: &Config) -> u32 {
        self.baud
            .or(config.connection.baud)
            .unwrap_or(DEFAULT_BAUD)
    }

    /// Write policy from CLI flags, then config.
    fn write_policy(&self, config: &Config) -> WritePolicy {
        if self.non_blocking {
            return WritePolicy::NonBlocking;
        }
        match self.write_timeout.or(config.connection.write_timeout_ms) {
            Some(ms) => WritePolicy::Timeout(Duration::from_millis(ms)),
            None => WritePolicy::Blocking,
        }
    }
}

/// Select a port and open a session on it.
pub(crate) fn open_session(cli: &Cli, config: &mut Config) -> Result<NativeSession> {
    let options = SerialOptions {
        port: cli.port.clone(),
        index: cli.index,
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
    };
    let selection = select_serial_port(&options, config)?;
    let baud = cli.baud_rate(config);
    let policy = cli.write_policy(config);

    let mut session = SerialSession::new();
    session
        .open_with_policy(selection.selector(), baud, policy)
        .with_context(|| format!("Failed to open {}", selection.port_name()))?;

    if !cli.non_interactive {
        ask_remember_port(&selection, config)?;
    }

    Ok(session)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if env::var("NO_COLOR").is_ok() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "picolink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // First Ctrl-C asks the running command to stop; a second one exits.
    if let Err(e) = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
    }) {
        debug!("Failed to install Ctrl-C handler: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => commands::list_ports::cmd_list_ports(*json, &config)?,
        Commands::Send { text } => {
            let command = Command::line(text)
                .map_err(|e| CliError::Usage(e.to_string()))?;
            commands::send::cmd_send(cli, &mut config, &command)?;
        },
        Commands::Byte { value } => commands::send::cmd_send(cli, &mut config, value)?,
        Commands::Console { allow } => commands::console::cmd_console(cli, &mut config, allow)?,
        Commands::Completions { shell } => commands::completions::cmd_completions(*shell)?,
    }

    Ok(())
}
