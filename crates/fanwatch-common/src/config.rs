//! Configuration model for the fanwatch monitor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{FanwatchError, Result};
use crate::types::InitFlags;

/// Tunables for the notification channel and the event loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Flags passed to `fanotify_init`.
    pub init_flags: InitFlags,
    /// Open flags for the event file descriptors the kernel hands back.
    pub event_file_flags: u32,
    /// How long one poll waits for the channel to become readable.
    pub poll_timeout_ms: u64,
    /// Consecutive empty polls tolerated while draining before the loop exits.
    pub drain_timeouts: u32,
    /// Delay after a close request before the channel is forcibly released.
    pub close_grace_ms: u64,
    /// Number of event records one read can hold.
    pub read_buffer_records: usize,
    /// Root of the proc filesystem used for process lookups.
    pub proc_root: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            init_flags: InitFlags::default(),
            event_file_flags: default_event_file_flags(),
            poll_timeout_ms: constants::DEFAULT_POLL_TIMEOUT_MS,
            drain_timeouts: constants::DEFAULT_DRAIN_TIMEOUTS,
            close_grace_ms: constants::DEFAULT_CLOSE_GRACE_MS,
            read_buffer_records: constants::DEFAULT_READ_BUFFER_RECORDS,
            proc_root: PathBuf::from(constants::DEFAULT_PROC_ROOT),
        }
    }
}

#[allow(clippy::cast_sign_loss)]
const fn default_event_file_flags() -> u32 {
    (libc::O_RDONLY | libc::O_LARGEFILE) as u32
}

impl MonitorConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or holds values that fail [`MonitorConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FanwatchError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every tunable is usable.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::Config`] for a zero poll timeout, drain
    /// count, or buffer size.
    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            return Err(FanwatchError::Config {
                message: "poll_timeout_ms must be greater than zero".into(),
            });
        }
        if self.drain_timeouts == 0 {
            return Err(FanwatchError::Config {
                message: "drain_timeouts must be greater than zero".into(),
            });
        }
        if self.read_buffer_records == 0 {
            return Err(FanwatchError::Config {
                message: "read_buffer_records must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Poll timeout as a [`Duration`].
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Close grace period as a [`Duration`].
    #[must_use]
    pub const fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Size in bytes of the channel read buffer.
    #[must_use]
    pub const fn read_buffer_len(&self) -> usize {
        self.read_buffer_records * constants::EVENT_METADATA_LEN
    }
}
