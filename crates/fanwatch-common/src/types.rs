//! Domain primitive types used across the fanwatch workspace.
//!
//! The flag sets mirror `include/uapi/linux/fanotify.h`; their numeric
//! values are part of the kernel ABI and must never change.

use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{FAN_ALLOW, FAN_DENY};

bitflags! {
    /// Event types reported by, and registered with, fanotify.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EventMask: u64 {
        /// File was accessed.
        const ACCESS = 0x0000_0001;
        /// File was modified.
        const MODIFY = 0x0000_0002;
        /// Metadata changed.
        const ATTRIB = 0x0000_0004;
        /// Writable file closed.
        const CLOSE_WRITE = 0x0000_0008;
        /// Read-only file closed.
        const CLOSE_NOWRITE = 0x0000_0010;
        /// File was opened.
        const OPEN = 0x0000_0020;
        /// File was moved from X.
        const MOVED_FROM = 0x0000_0040;
        /// File was moved to Y.
        const MOVED_TO = 0x0000_0080;
        /// Subfile was created.
        const CREATE = 0x0000_0100;
        /// Subfile was deleted.
        const DELETE = 0x0000_0200;
        /// Watched object was deleted.
        const DELETE_SELF = 0x0000_0400;
        /// Watched object was moved.
        const MOVE_SELF = 0x0000_0800;
        /// File was opened for execution.
        const OPEN_EXEC = 0x0000_1000;
        /// Event queue overflowed.
        const Q_OVERFLOW = 0x0000_4000;
        /// Filesystem error.
        const FS_ERROR = 0x0000_8000;
        /// File open in permission check.
        const OPEN_PERM = 0x0001_0000;
        /// File accessed in permission check.
        const ACCESS_PERM = 0x0002_0000;
        /// Interested in events on children of a marked directory.
        const EVENT_ON_CHILD = 0x0800_0000;
        /// Event occurred against a directory.
        const ONDIR = 0x4000_0000;

        /// Either close variant.
        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        /// The classic notification events.
        const ALL_EVENTS = Self::ACCESS.bits()
            | Self::MODIFY.bits()
            | Self::CLOSE.bits()
            | Self::OPEN.bits();
        /// Events the kernel blocks on until a response is written.
        const ALL_PERM_EVENTS = Self::OPEN_PERM.bits() | Self::ACCESS_PERM.bits();
        /// Everything a group may receive.
        const ALL_OUTGOING_EVENTS = Self::ALL_EVENTS.bits()
            | Self::ALL_PERM_EVENTS.bits()
            | Self::Q_OVERFLOW.bits();
    }
}

impl EventMask {
    /// Returns `true` if the kernel expects a decision for this mask.
    #[must_use]
    pub const fn requires_response(self) -> bool {
        self.intersects(Self::ALL_PERM_EVENTS)
    }

    /// Parses a comma-separated list of flag names, e.g. `"OPEN,CLOSE_WRITE"`.
    ///
    /// Names are matched case-insensitively; unknown names yield `None`.
    #[must_use]
    pub fn from_names(list: &str) -> Option<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .try_fold(Self::empty(), |acc, name| {
                Self::from_name(&name.to_ascii_uppercase()).map(|flag| acc | flag)
            })
    }

    /// Every named flag and composite, in declaration order.
    pub fn named_flags() -> impl Iterator<Item = (&'static str, Self)> {
        <Self as bitflags::Flags>::FLAGS
            .iter()
            .map(|flag| (flag.name(), *flag.value()))
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "0x0");
        }
        bitflags::parser::to_writer(self, f)
    }
}

bitflags! {
    /// Flags for `fanotify_init`.
    ///
    /// The notification class occupies two bits and is not a true flag;
    /// pick exactly one of the `CLASS_*` values.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct InitFlags: u32 {
        /// Close-on-exec for the group descriptor.
        const CLOEXEC = 0x0000_0001;
        /// Non-blocking group descriptor.
        const NONBLOCK = 0x0000_0002;
        /// Pure notification class.
        const CLASS_NOTIF = 0x0000_0000;
        /// Content class, receives permission events after content is final.
        const CLASS_CONTENT = 0x0000_0004;
        /// Pre-content class, receives permission events before content.
        const CLASS_PRE_CONTENT = 0x0000_0008;
        /// Lift the event queue limit.
        const UNLIMITED_QUEUE = 0x0000_0010;
        /// Lift the per-group mark limit.
        const UNLIMITED_MARKS = 0x0000_0020;
    }
}

impl Default for InitFlags {
    fn default() -> Self {
        Self::CLOEXEC | Self::CLASS_CONTENT | Self::UNLIMITED_MARKS
    }
}

bitflags! {
    /// Flags for `fanotify_mark`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MarkFlags: u32 {
        /// Add the mask to the mark.
        const ADD = 0x0000_0001;
        /// Remove the mask from the mark.
        const REMOVE = 0x0000_0002;
        /// Mark a symlink itself rather than its target.
        const DONT_FOLLOW = 0x0000_0004;
        /// Fail unless the path is a directory.
        const ONLYDIR = 0x0000_0008;
        /// Mark the whole mount containing the path.
        const MOUNT = 0x0000_0010;
        /// Remove every mark of the given type.
        const FLUSH = 0x0000_0080;
    }
}

/// Direction of a mark operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkOp {
    /// Install a watch.
    Add,
    /// Remove a watch.
    Remove,
}

impl MarkOp {
    /// Returns the kernel flag for this operation.
    #[must_use]
    pub const fn flags(self) -> MarkFlags {
        match self {
            Self::Add => MarkFlags::ADD,
            Self::Remove => MarkFlags::REMOVE,
        }
    }
}

impl fmt::Display for MarkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Answer to a permission event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    /// Let the operation proceed.
    Allow,
    /// Fail the operation with `EPERM`.
    Deny,
}

impl Decision {
    /// Returns the `response` field value written to the kernel.
    #[must_use]
    pub const fn wire_value(self) -> u32 {
        match self {
            Self::Allow => FAN_ALLOW,
            Self::Deny => FAN_DENY,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Identity of the process behind an event.
///
/// Every field except `pid` is best-effort: the process may have exited
/// before its metadata was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Process identifier.
    pub pid: i32,
    /// Short executable name.
    pub name: Option<String>,
    /// Absolute path of the executable.
    pub path: Option<String>,
    /// Command-line arguments, in order.
    pub cmdline: Vec<String>,
    /// Effective user id.
    pub euid: Option<u32>,
    /// Name of the effective user.
    pub user: Option<String>,
    /// Parent process identifier.
    pub ppid: Option<i32>,
    /// Short executable name of the parent.
    pub parent_name: Option<String>,
    /// Absolute executable path of the parent.
    pub parent_path: Option<String>,
}

impl ProcessInfo {
    /// Creates an empty record for `pid`.
    #[must_use]
    pub fn new(pid: i32) -> Self {
        Self {
            pid,
            ..Self::default()
        }
    }
}

/// An event enriched with process identity, as handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    /// When the event was decoded.
    pub timestamp: DateTime<Utc>,
    /// Event types set on the record.
    pub mask: EventMask,
    /// Path of the file the event concerns, if it could be resolved.
    pub path: Option<PathBuf>,
    /// Process that triggered the event.
    pub process: ProcessInfo,
}

impl FileEvent {
    /// Returns `true` if this event was a permission check.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        self.mask.requires_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_masks_match_kernel_values() {
        assert_eq!(EventMask::CLOSE.bits(), 0x18);
        assert_eq!(EventMask::ALL_EVENTS.bits(), 0x3b);
        assert_eq!(EventMask::ALL_PERM_EVENTS.bits(), 0x30000);
        assert_eq!(EventMask::ALL_OUTGOING_EVENTS.bits(), 0x3403b);
    }

    #[test]
    fn only_permission_bits_require_response() {
        assert!(EventMask::OPEN_PERM.requires_response());
        assert!((EventMask::ACCESS_PERM | EventMask::MODIFY).requires_response());
        assert!(!EventMask::ALL_EVENTS.requires_response());
        assert!(!EventMask::Q_OVERFLOW.requires_response());
    }

    #[test]
    fn from_names_accepts_mixed_case_list() {
        let mask = EventMask::from_names("open, close_write,MODIFY").expect("valid names");
        assert_eq!(
            mask,
            EventMask::OPEN | EventMask::CLOSE_WRITE | EventMask::MODIFY
        );
    }

    #[test]
    fn from_names_rejects_unknown() {
        assert!(EventMask::from_names("OPEN,RENAME_ALL").is_none());
    }

    #[test]
    fn named_flags_include_composites() {
        let named: Vec<_> = EventMask::named_flags().collect();
        assert_eq!(named.first(), Some(&("ACCESS", EventMask::ACCESS)));
        assert!(named.contains(&("ALL_PERM_EVENTS", EventMask::ALL_PERM_EVENTS)));
    }

    #[test]
    fn default_init_flags_select_content_class() {
        let flags = InitFlags::default();
        assert_eq!(flags.bits(), 0x25);
    }

    #[test]
    fn decision_wire_values() {
        assert_eq!(Decision::Allow.wire_value(), 0x01);
        assert_eq!(Decision::Deny.wire_value(), 0x02);
    }

    #[test]
    fn mark_op_maps_to_flags() {
        assert_eq!(MarkOp::Add.flags().bits(), 0x1);
        assert_eq!(MarkOp::Remove.flags().bits(), 0x2);
    }

    #[test]
    fn event_mask_display_lists_names() {
        let shown = (EventMask::OPEN | EventMask::MODIFY).to_string();
        assert!(shown.contains("OPEN"));
        assert!(shown.contains("MODIFY"));
        assert_eq!(EventMask::empty().to_string(), "0x0");
    }
}
