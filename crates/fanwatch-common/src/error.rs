//! Unified error types for the fanwatch workspace.
//!
//! Per-record and per-path failures are reported through these variants
//! and logged by their callers; only channel-level I/O errors are meant to
//! travel far enough to end the event loop.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum FanwatchError {
    /// The caller lacks the privilege to create a fanotify group.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// The running kernel does not provide fanotify or the requested mode.
    #[error("fanotify unsupported by this kernel: {message}")]
    UnsupportedKernel {
        /// Description of the missing capability.
        message: String,
    },

    /// `fanotify_init` failed for a reason other than privilege or support.
    #[error("fanotify_init failed: {source}")]
    Init {
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Adding or removing a mark failed for one path.
    #[error("mark on {} failed: {}", path.display(), std::io::Error::from_raw_os_error(*errno))]
    Mark {
        /// Path the mark was requested for.
        path: PathBuf,
        /// Raw `errno` reported by `fanotify_mark`.
        errno: i32,
    },

    /// A record in the event stream could not be decoded.
    #[error("malformed event record: {message}")]
    Decode {
        /// Description of the decoding problem.
        message: String,
    },

    /// Reading from the notification channel failed.
    #[error("failed to read from notification channel: {source}")]
    Read {
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a permission response failed.
    #[error("failed to answer permission event for fd {fd}: {source}")]
    ResponseWrite {
        /// Event descriptor that was being answered.
        fd: i32,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The process exited before its metadata could be read.
    #[error("process {pid} not found while reading {what}")]
    ProcessNotFound {
        /// Process identifier that was looked up.
        pid: i32,
        /// Which piece of process metadata was being read.
        what: &'static str,
    },

    /// The path is already being watched.
    #[error("already watching {}", path.display())]
    DuplicateWatch {
        /// Path that was registered twice.
        path: PathBuf,
    },

    /// The operation is not allowed in the monitor's current state.
    #[error("cannot {operation} while monitor is {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the monitor was in.
        state: String,
    },

    /// The notification channel has already been released.
    #[error("notification channel is closed")]
    ChannelClosed,

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl FanwatchError {
    /// Returns `true` for failures caused by a process that already exited.
    #[must_use]
    pub const fn is_process_gone(&self) -> bool {
        matches!(self, Self::ProcessNotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FanwatchError>;
