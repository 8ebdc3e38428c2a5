//! Serial port selection.
//!
//! Resolves which port a command talks to:
//! - An explicit `--port` name or `--index` into the current listing
//! - The port remembered in configuration
//! - Otherwise the discovered likely targets, prompting when several match
//!   and a terminal is attached
//! - Non-interactive runs fall back to the default-selection policy

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    picolink::{DefaultSelection, PortDescriptor, PortSelector, format_port_list},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Index into the current port listing.
    pub index: Option<usize>,
    /// Consider all ports, not only likely targets.
    pub list_all_ports: bool,
    /// Non-interactive mode (never prompt).
    pub non_interactive: bool,
}

/// The port a command should open.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Open by exact system name.
    Name(String),
    /// Open entry `index` of a captured listing.
    Listed {
        /// Captured listing.
        ports: Vec<PortDescriptor>,
        /// Chosen entry.
        index: usize,
        /// Whether the user picked it at a prompt.
        prompted: bool,
    },
}

impl Selection {
    /// Selector to hand to the session.
    pub fn selector(&self) -> PortSelector<'_> {
        match self {
            Self::Name(name) => PortSelector::Name(name),
            Self::Listed { ports, index, .. } => PortSelector::Index {
                ports,
                index: *index,
            },
        }
    }

    /// Name of the selected port.
    pub fn port_name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Listed { ports, index, .. } => ports
                .get(*index)
                .map_or("", |p| p.system_name.as_str()),
        }
    }
}

fn usage_err(message: impl Into<String>) -> anyhow::Error {
    // Selection failures are setup problems: exit code 2.
    CliError::Usage(message.into()).into()
}

/// Select the serial port for a command.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<Selection> {
    if let Some(port_name) = &options.port {
        return Ok(Selection::Name(port_name.clone()));
    }

    if let Some(index) = options.index {
        let ports: Vec<PortDescriptor> = picolink::discover().collect();
        if index >= ports.len() {
            return Err(usage_err(format!(
                "Port index {index} is out of range ({} port(s) found)",
                ports.len()
            )));
        }
        return Ok(Selection::Listed {
            ports,
            index,
            prompted: false,
        });
    }

    if let Some(port_name) = &config.connection.port {
        debug!("Using port from config: {port_name}");
        return Ok(Selection::Name(port_name.clone()));
    }

    let ports: Vec<PortDescriptor> = picolink::discover().collect();
    let candidates = candidate_ports(ports, options, config)?;

    let interactive = !options.non_interactive
        && std::io::stdin().is_terminal()
        && std::io::stderr().is_terminal();
    if interactive && candidates.len() > 1 {
        return select_port_interactive(candidates);
    }

    choose_default(candidates)
}

/// Narrow the discovered ports to the ones worth offering.
fn candidate_ports(
    ports: Vec<PortDescriptor>,
    options: &SerialOptions,
    config: &Config,
) -> Result<Vec<PortDescriptor>> {
    if ports.is_empty() {
        return Err(usage_err("No serial ports found"));
    }

    let likely: Vec<PortDescriptor> = ports
        .iter()
        .filter(|p| is_likely_device(p, config))
        .cloned()
        .collect();

    if options.list_all_ports || likely.is_empty() {
        Ok(ports)
    } else {
        Ok(likely)
    }
}

/// Apply the default-selection policy without prompting.
fn choose_default(candidates: Vec<PortDescriptor>) -> Result<Selection> {
    let index = DefaultSelection::FirstLikelyTarget
        .pick(&candidates)
        .ok_or_else(|| usage_err("No serial ports available"))?;

    if candidates.len() > 1 {
        info!(
            "{} candidate ports, using the first: {}",
            candidates.len(),
            candidates[index].system_name
        );
    } else {
        info!(
            "Auto-selected port: {} ({})",
            candidates[index].system_name, candidates[index].descriptive_name
        );
    }

    Ok(Selection::Listed {
        ports: candidates,
        index,
        prompted: false,
    })
}

/// Check if a port is a likely target (name heuristic or configured USB ID).
fn is_likely_device(port: &PortDescriptor, config: &Config) -> bool {
    port.is_likely_target || config.is_configured_device(port.vid, port.pid)
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                CliError::Usage(format!("Port prompt failed: {io_err}")).into()
            }
        },
    }
}

/// Interactive port selection.
fn select_port_interactive(ports: Vec<PortDescriptor>) -> Result<Selection> {
    eprintln!("{} Found {} serial ports", style("ℹ").blue(), ports.len());

    // Truncate labels so narrow terminals do not wrap.
    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = format_port_list(&ports)
        .into_iter()
        .map(|label| console::truncate_str(&label, max_item_width, "\u{2026}").into_owned())
        .collect();

    let default = DefaultSelection::FirstLikelyTarget
        .pick(&ports)
        .unwrap_or(0);
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(default)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => Ok(Selection::Listed {
            ports,
            index,
            prompted: true,
        }),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}

/// Offer to remember a port picked at the prompt.
pub fn ask_remember_port(selection: &Selection, config: &mut Config) -> Result<()> {
    let Selection::Listed {
        ports,
        index,
        prompted: true,
    } = selection
    else {
        return Ok(());
    };
    let Some(port) = ports.get(*index) else {
        return Ok(());
    };

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {} for future runs?", port.system_name))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_port(&port.system_name, port.vid, port.pid) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}
