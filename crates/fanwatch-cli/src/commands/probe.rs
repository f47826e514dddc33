//! `fanwatch probe`: Report what fanotify supports on this host.

use std::path::PathBuf;

use clap::Args;
use fanwatch_common::error::FanwatchError;
use fanwatch_core::{FanotifyChannel, NotifyChannel, probe_permission_events};

/// Arguments for the `probe` command.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Directory in which to create the scratch directory that gets marked.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// JSON file with monitor settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Executes the `probe` command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the group
/// fails for an unexpected reason, or the scratch directory cannot be
/// created.
pub fn execute(args: ProbeArgs) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;

    let channel = match FanotifyChannel::from_config(&config) {
        Ok(channel) => channel,
        Err(
            e @ (FanwatchError::PermissionDenied { .. } | FanwatchError::UnsupportedKernel { .. }),
        ) => {
            println!("fanotify:          unavailable ({e})");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    println!("fanotify:          available");

    let supported = probe_permission_events(&channel, args.dir.as_deref())?;
    channel.close();
    println!(
        "permission events: {}",
        if supported { "supported" } else { "unsupported" }
    );
    Ok(())
}
