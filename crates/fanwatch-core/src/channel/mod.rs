//! The notification channel: one fanotify group and its wire protocol.
//!
//! The monitor talks to the kernel only through [`NotifyChannel`], so the
//! event loop can run against the real [`FanotifyChannel`] or an in-memory
//! stand-in.

pub mod fanotify;
pub mod wire;

use std::path::Path;
use std::time::Duration;

use fanwatch_common::error::Result;
use fanwatch_common::types::{Decision, EventMask, MarkOp};

use crate::event::Event;

pub use self::fanotify::FanotifyChannel;

/// Result of waiting for the channel to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Events are queued.
    Ready,
    /// The timeout elapsed with nothing to read.
    TimedOut,
    /// The wait was interrupted by a signal.
    Interrupted,
}

/// Operations the monitor needs from a notification channel.
///
/// Implementations serialise access to their descriptor internally; every
/// method takes `&self` so marks can be added while the loop is polling.
pub trait NotifyChannel: Send + Sync {
    /// Installs or removes a mark for `mask` on `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::Mark`](fanwatch_common::error::FanwatchError::Mark)
    /// if the kernel rejects the request.
    fn mark(&self, op: MarkOp, mask: EventMask, path: &Path) -> Result<()>;

    /// Blocks until events are readable or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error if polling fails for any reason other than a signal.
    fn wait_readable(&self, timeout: Duration) -> Result<PollOutcome>;

    /// Performs one read and returns the decoded events.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or reaches end-of-stream.
    fn read_events(&self) -> Result<Vec<Event>>;

    /// Writes the decision for a permission event.
    ///
    /// # Errors
    ///
    /// Returns an error if the response cannot be written.
    fn respond(&self, event: &Event, decision: Decision) -> Result<()>;

    /// Releases the underlying descriptor. Later calls are no-ops.
    fn close(&self);

    /// Returns `true` once [`NotifyChannel::close`] has run.
    fn is_closed(&self) -> bool;
}
