//! # fanwatch-core
//!
//! Filesystem activity monitoring on top of Linux fanotify.
//!
//! This crate provides:
//! - **Channel**: a fanotify group, its binary record format, and the
//!   [`NotifyChannel`] seam the monitor is written against.
//! - **Process identity**: best-effort lookups of name, executable,
//!   command line, and owner through the proc filesystem.
//! - **Monitor**: watch bookkeeping, the event loop that delivers
//!   enriched [`FileEvent`](fanwatch_common::types::FileEvent)s and answers
//!   permission events, and a bounded shutdown.
//!
//! Unsafe code is confined to [`channel::fanotify`] and [`event`] and
//! carries `// SAFETY:` notes.

pub mod channel;
pub mod event;
pub mod monitor;
pub mod policy;
pub mod probe;
pub mod procfs;

pub use channel::{FanotifyChannel, NotifyChannel, PollOutcome};
pub use event::{Event, EventFile, EventMetadata};
pub use monitor::{EventStream, Monitor, MonitorState};
pub use policy::{AllowAll, PermissionPolicy};
pub use probe::probe_permission_events;
pub use procfs::ProcFs;
