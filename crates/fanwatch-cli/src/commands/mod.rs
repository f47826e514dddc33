//! CLI command definitions and dispatch.

pub mod masks;
pub mod probe;
pub mod watch;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fanwatch_common::config::MonitorConfig;

/// fanwatch: see which processes touch your files.
#[derive(Parser, Debug)]
#[command(name = fanwatch_common::constants::APP_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit diagnostic logs as JSON (filter with `RUST_LOG`).
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch paths and print every access as it happens.
    Watch(watch::WatchArgs),
    /// Check whether fanotify and permission events are usable here.
    Probe(probe::ProbeArgs),
    /// List the event names accepted by `watch --events`.
    Masks(masks::MasksArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Watch(args) => watch::execute(args),
        Command::Probe(args) => probe::execute(args),
        Command::Masks(args) => masks::execute(&args),
    }
}

/// Loads the monitor configuration from `path`, or the defaults.
fn load_config(path: Option<&Path>) -> anyhow::Result<MonitorConfig> {
    path.map_or_else(
        || Ok(MonitorConfig::default()),
        |p| {
            MonitorConfig::from_file(p)
                .with_context(|| format!("failed to load configuration from {}", p.display()))
        },
    )
}
