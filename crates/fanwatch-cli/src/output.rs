//! Formatted output helpers for CLI commands.

use fanwatch_common::types::{FileEvent, ProcessInfo};

/// Formats one event as a single human-readable line.
///
/// Unknown fields are shown as `-`.
#[must_use]
pub fn format_event(event: &FileEvent) -> String {
    let path = event
        .path
        .as_ref()
        .map_or_else(|| "-".to_string(), |p| p.display().to_string());
    format!(
        "{} {:<16} {} {}",
        event.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        event.mask.to_string(),
        path,
        format_process(&event.process)
    )
}

/// Formats process identity as `pid=… name=… user=… exe=… parent=…`.
#[must_use]
pub fn format_process(process: &ProcessInfo) -> String {
    let user = match (&process.user, process.euid) {
        (Some(name), _) => name.clone(),
        (None, Some(uid)) => uid.to_string(),
        (None, None) => "-".to_string(),
    };
    let parent = match (process.ppid, &process.parent_name) {
        (Some(ppid), Some(name)) => format!("{ppid}:{name}"),
        (Some(ppid), None) => ppid.to_string(),
        (None, _) => "-".to_string(),
    };
    format!(
        "pid={} name={} user={user} exe={} parent={parent}",
        process.pid,
        process.name.as_deref().unwrap_or("-"),
        process.path.as_deref().unwrap_or("-"),
    )
}
