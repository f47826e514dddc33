//! Kernel ABI constants and default tunables.

/// fanotify metadata version this build understands.
pub const FANOTIFY_METADATA_VERSION: u8 = 3;

/// Size in bytes of one `fanotify_event_metadata` record.
pub const EVENT_METADATA_LEN: usize = 24;

/// Size in bytes of one `fanotify_response` record.
pub const RESPONSE_LEN: usize = 8;

/// Descriptor value the kernel reports when an event carries no file.
pub const FAN_NOFD: i32 = -1;

/// Response value granting a permission event.
pub const FAN_ALLOW: u32 = 0x01;

/// Response value refusing a permission event.
pub const FAN_DENY: u32 = 0x02;

/// Number of records the read buffer is sized for by default.
pub const DEFAULT_READ_BUFFER_RECORDS: usize = 200;

/// Default poll timeout for the event loop, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1_000;

/// Consecutive empty poll timeouts tolerated while draining.
pub const DEFAULT_DRAIN_TIMEOUTS: u32 = 2;

/// Default delay before a requested close forcibly releases the channel.
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 5_000;

/// Mount point of the proc filesystem.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Length at which the kernel truncates `Name:` in `/proc/<pid>/status`.
///
/// The field holds 16 bytes including the terminator, so a 15-byte name
/// may have been cut short.
pub const MAX_STATUS_NAME_LEN: usize = 15;

/// Placeholder name reported for processes started through an `exec` shim.
pub const GENERIC_EXEC_NAME: &str = "exec";

/// Characters at which a `Name:` value is cut.
pub const NAME_SEPARATORS: &[char] = &['/', ':', ' ', ';', ','];

/// Suffix the kernel appends to `/proc/<pid>/exe` when the binary is gone.
pub const DELETED_EXE_SUFFIX: &str = " (deleted)";

/// Application name used in CLI output.
pub const APP_NAME: &str = "fanwatch";
