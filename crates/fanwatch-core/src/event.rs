//! Decoded fanotify records and the file references they carry.

use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use fanwatch_common::constants::FAN_NOFD;
use fanwatch_common::types::EventMask;

/// One `fanotify_event_metadata` record exactly as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMetadata {
    /// Total length of the record, including any trailing info records.
    pub event_len: u32,
    /// Metadata format version.
    pub version: u8,
    /// Reserved, always zero.
    pub reserved: u8,
    /// Length of the fixed header.
    pub metadata_len: u16,
    /// Event types set on this record.
    pub mask: EventMask,
    /// Descriptor the kernel opened for the object, or [`FAN_NOFD`].
    pub fd: i32,
    /// Process that caused the event.
    pub pid: i32,
}

/// A descriptor the kernel opened on our behalf for one event.
///
/// Closed exactly once, when the value is dropped.
pub struct EventFile(OwnedFd);

impl EventFile {
    /// Wraps a descriptor taken from an event.
    #[must_use]
    pub const fn new(fd: OwnedFd) -> Self {
        Self(fd)
    }
}

impl AsFd for EventFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl AsRawFd for EventFile {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl fmt::Debug for EventFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventFile").field(&self.0.as_raw_fd()).finish()
    }
}

/// A decoded event together with the file reference it owns.
///
/// The reference lives exactly as long as the `Event`; once dispatch is
/// done and the event goes out of scope the kernel descriptor is closed,
/// whatever happened in between.
#[derive(Debug)]
pub struct Event {
    metadata: EventMetadata,
    file: Option<EventFile>,
}

impl Event {
    /// Builds an event from its metadata and an already-owned descriptor.
    #[must_use]
    pub fn new(metadata: EventMetadata, file: Option<OwnedFd>) -> Self {
        Self {
            metadata,
            file: file.map(EventFile::new),
        }
    }

    /// Takes ownership of the descriptor named in `metadata`.
    ///
    /// # Safety
    ///
    /// `metadata.fd` must be either [`FAN_NOFD`] or an open descriptor that
    /// was just read from a fanotify group and is owned by nobody else.
    #[allow(unsafe_code)]
    pub(crate) unsafe fn from_wire(metadata: EventMetadata) -> Self {
        let file = (metadata.fd != FAN_NOFD && metadata.fd >= 0)
            // SAFETY: guaranteed by the caller; the kernel installed this
            // descriptor in our table for this event only.
            .then(|| unsafe { OwnedFd::from_raw_fd(metadata.fd) });
        Self::new(metadata, file)
    }

    /// Event types set on this record.
    #[must_use]
    pub const fn mask(&self) -> EventMask {
        self.metadata.mask
    }

    /// Process that caused the event.
    #[must_use]
    pub const fn pid(&self) -> i32 {
        self.metadata.pid
    }

    /// Descriptor number a response must name.
    #[must_use]
    pub const fn fd(&self) -> i32 {
        self.metadata.fd
    }

    /// The owned file reference, if the event carries one.
    #[must_use]
    pub const fn file(&self) -> Option<&EventFile> {
        self.file.as_ref()
    }

    /// Returns `true` if the kernel is blocked waiting for a decision.
    #[must_use]
    pub const fn requires_response(&self) -> bool {
        self.metadata.mask.requires_response()
    }
}
