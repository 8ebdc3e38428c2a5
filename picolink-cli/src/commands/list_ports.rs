//! `list-ports` command.

use anyhow::Result;
use console::style;
use picolink::{DefaultSelection, PortDescriptor, format_port_list_with};

use crate::config::Config;

/// List available serial ports.
///
/// JSON goes to stdout; the human-readable listing goes to stderr.
pub(crate) fn cmd_list_ports(json: bool, config: &Config) -> Result<()> {
    let ports: Vec<PortDescriptor> = picolink::discover().collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    if ports.is_empty() {
        eprintln!("{} No serial ports found", style("⚠").yellow());
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports:").bold());
    for line in format_entries(&ports, config) {
        eprintln!("  {line}");
    }

    if let Some(default) = DefaultSelection::FirstLikelyTarget.pick(&ports) {
        eprintln!();
        eprintln!(
            "{} Default: {}",
            style("→").green(),
            style(&ports[default].system_name).cyan()
        );
    }

    Ok(())
}

/// Listing lines prefixed with the index `--index` accepts.
fn format_entries(ports: &[PortDescriptor], config: &Config) -> Vec<String> {
    format_port_list_with(ports, |port| {
        port.is_likely_target || config.is_configured_device(port.vid, port.pid)
    })
    .into_iter()
    .enumerate()
    .map(|(index, line)| format!("[{index}] {line}"))
    .collect()
}
