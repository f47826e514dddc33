//! Verdicts for permission-class events.

use fanwatch_common::types::{Decision, FileEvent};

/// Decides whether a permission-class access may proceed.
///
/// Called on the event loop thread once per permission event, before the
/// event is handed to the consumer. The accessing process stays blocked
/// until the answer is written.
pub trait PermissionPolicy: Send + Sync {
    /// Returns the verdict for `event`.
    fn decide(&self, event: &FileEvent) -> Decision;
}

/// Allows every access.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionPolicy for AllowAll {
    fn decide(&self, _event: &FileEvent) -> Decision {
        Decision::Allow
    }
}

impl<F> PermissionPolicy for F
where
    F: Fn(&FileEvent) -> Decision + Send + Sync,
{
    fn decide(&self, event: &FileEvent) -> Decision {
        self(event)
    }
}
