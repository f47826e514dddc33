//! Start-up check for permission-event support.

use std::path::Path;

use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::types::{EventMask, MarkOp};

use crate::channel::NotifyChannel;

/// Prefix of the scratch directory marked during the probe.
pub const PROBE_DIR_PREFIX: &str = "fan_test";

/// Reports whether `channel` accepts permission-class marks.
///
/// Creates a scratch directory inside `parent` (the system temp directory
/// when `None`), marks it for `OPEN_PERM | ONDIR`, then removes the mark.
/// A rejected mark means permission events are unavailable; a failure to
/// remove it is only logged. The scratch directory is always deleted.
///
/// # Errors
///
/// Returns [`FanwatchError::Io`] if the scratch directory cannot be
/// created.
pub fn probe_permission_events<C: NotifyChannel + ?Sized>(
    channel: &C,
    parent: Option<&Path>,
) -> Result<bool> {
    let parent = parent.map_or_else(std::env::temp_dir, Path::to_path_buf);
    let scratch = tempfile::Builder::new()
        .prefix(PROBE_DIR_PREFIX)
        .tempdir_in(&parent)
        .map_err(|e| FanwatchError::Io {
            path: parent.clone(),
            source: e,
        })?;
    let mask = EventMask::OPEN_PERM | EventMask::ONDIR;

    if let Err(e) = channel.mark(MarkOp::Add, mask, scratch.path()) {
        tracing::info!(error = %e, "permission events not supported");
        return Ok(false);
    }
    if let Err(e) = channel.mark(MarkOp::Remove, mask, scratch.path()) {
        tracing::warn!(error = %e, "failed to remove probe mark");
    }
    tracing::debug!(dir = %scratch.path().display(), "permission events supported");
    Ok(true)
}
