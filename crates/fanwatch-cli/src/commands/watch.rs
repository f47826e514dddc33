//! `fanwatch watch`: Stream accesses to the given paths.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use fanwatch_common::error::FanwatchError;
use fanwatch_common::types::EventMask;
use fanwatch_core::Monitor;

use crate::output;

/// Arguments for the `watch` command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Files or directories to watch.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Comma-separated event names (see `fanwatch masks`).
    #[arg(short, long, default_value = "OPEN,CLOSE_WRITE")]
    pub events: String,

    /// Also intercept opens and reads as permission events (always allowed).
    #[arg(long)]
    pub perm: bool,

    /// Print one JSON object per event.
    #[arg(long)]
    pub json: bool,

    /// JSON file with monitor settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Executes the `watch` command.
///
/// Runs the event loop on a worker thread and prints events until
/// Ctrl+C, which removes the watches and lets the loop drain.
///
/// # Errors
///
/// Returns an error if the event list is invalid, the monitor cannot be
/// opened, a path cannot be watched, or the loop fails.
pub fn execute(args: WatchArgs) -> anyhow::Result<()> {
    let mask = watch_mask(&args.events, args.perm)?;
    let config = super::load_config(args.config.as_deref())?;
    let wait_limit = config.close_grace() + Duration::from_secs(1);

    let (done_tx, done_rx) = mpsc::channel();
    let (monitor, events) =
        Monitor::open(config, done_tx).context("failed to open fanotify monitor")?;
    let monitor = Arc::new(monitor);

    for path in &args.paths {
        monitor
            .add_watch(path, mask)
            .with_context(|| format!("cannot watch {}", path.display()))?;
    }

    let m = Arc::clone(&monitor);
    let runner = std::thread::Builder::new()
        .name("fanwatch-loop".into())
        .spawn(move || m.run())
        .context("failed to start event loop")?;

    let stop_requested = Arc::new(AtomicBool::new(false));
    let m = Arc::clone(&monitor);
    let stop = Arc::clone(&stop_requested);
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
        let failures = m.remove_all_watches();
        if !failures.is_empty() {
            tracing::warn!(failed = failures.len(), "some watches could not be removed");
        }
        m.request_close();
    })
    .context("failed to set Ctrl+C handler")?;

    eprintln!(
        "Watching {} path(s) for {mask}. Press Ctrl+C to stop.",
        args.paths.len()
    );
    for event in events {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", output::format_event(&event));
        }
    }

    if done_rx.recv_timeout(wait_limit).is_err() {
        tracing::warn!("monitor did not signal completion");
    }
    let result = runner
        .join()
        .map_err(|_| anyhow::anyhow!("event loop thread panicked"))?;
    loop_outcome(result, stop_requested.load(Ordering::SeqCst))
}

/// Maps the loop's result to the command's.
///
/// A stop that lands before the loop starts closes the idle monitor, so
/// the loop then refuses to run. That is still a clean exit.
fn loop_outcome(
    result: fanwatch_common::error::Result<()>,
    stop_requested: bool,
) -> anyhow::Result<()> {
    match result {
        Err(FanwatchError::InvalidState { .. }) if stop_requested => {
            tracing::debug!("stopped before the event loop started");
            Ok(())
        }
        other => other.context("event loop failed"),
    }
}

/// Builds the mark mask from an event list and the `--perm` switch.
fn watch_mask(events: &str, perm: bool) -> anyhow::Result<EventMask> {
    let mut mask = EventMask::from_names(events)
        .with_context(|| format!("unknown event name in '{events}'"))?;
    if perm {
        mask |= EventMask::ALL_PERM_EVENTS;
    }
    if mask.is_empty() {
        anyhow::bail!("no events selected");
    }
    Ok(mask)
}
