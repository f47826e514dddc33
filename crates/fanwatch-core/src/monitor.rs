//! The monitor: watch bookkeeping, the event loop, and shutdown.
//!
//! A [`Monitor`] moves through `Idle → Running → Draining → Closed`.
//! Lifecycle state, the watch map, and the completion sender share one
//! mutex. Events reach the consumer through a zero-capacity channel, so a
//! consumer that stops reading stops the loop with it.

use std::collections::BTreeMap;
use std::fmt;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use fanwatch_common::config::MonitorConfig;
use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::types::{Decision, EventMask, FileEvent, MarkOp};
use nix::unistd::getpid;

use crate::channel::{FanotifyChannel, NotifyChannel, PollOutcome};
use crate::event::Event;
use crate::policy::{AllowAll, PermissionPolicy};
use crate::procfs::ProcFs;

/// Lifecycle state of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorState {
    /// Created; watches may be added, the loop has not started.
    Idle,
    /// The event loop is delivering events.
    Running,
    /// Close was requested; the loop stops once the queue goes quiet.
    Draining,
    /// The channel is released and completion has been signalled.
    Closed,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Shared {
    state: MonitorState,
    watches: BTreeMap<PathBuf, EventMask>,
    completion: Option<Sender<()>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Moves to `Closed`, releases the channel, then signals completion.
///
/// Only the first call sends the completion signal.
fn finish<C: NotifyChannel>(channel: &C, shared: &Mutex<Shared>) {
    let (previous, completion) = {
        let mut guard = lock(shared);
        let previous = guard.state;
        guard.state = MonitorState::Closed;
        (previous, guard.completion.take())
    };
    channel.close();
    if let Some(tx) = completion {
        tracing::info!(from = %previous, "monitor closed");
        if tx.send(()).is_err() {
            tracing::debug!("completion receiver already dropped");
        }
    }
}

/// Receiving end of the event stream produced by [`Monitor::run`].
///
/// Iteration ends once the monitor stops delivering events.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<FileEvent>,
}

impl EventStream {
    /// Waits up to `timeout` for the next event.
    ///
    /// # Errors
    ///
    /// Returns [`RecvTimeoutError::Timeout`] if nothing arrived in time and
    /// [`RecvTimeoutError::Disconnected`] once the monitor has stopped.
    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<FileEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

impl Iterator for EventStream {
    type Item = FileEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

/// Watches paths through a notification channel and streams what happens
/// on them.
///
/// Share it behind an [`Arc`]: one thread calls [`Monitor::run`] while
/// others add watches or call [`Monitor::request_close`].
///
/// Accesses made by this process are allowed at once, without process
/// lookups, and are never delivered.
pub struct Monitor<C: NotifyChannel + 'static = FanotifyChannel> {
    channel: Arc<C>,
    shared: Arc<Mutex<Shared>>,
    config: MonitorConfig,
    procfs: ProcFs,
    policy: Box<dyn PermissionPolicy>,
    sink: Mutex<Option<SyncSender<FileEvent>>>,
    self_pid: i32,
}

impl Monitor<FanotifyChannel> {
    /// Opens a fanotify group configured by `config`.
    ///
    /// `completion` receives exactly one message once the monitor has
    /// released its channel.
    ///
    /// # Errors
    ///
    /// Returns the error from [`FanotifyChannel::from_config`].
    pub fn open(config: MonitorConfig, completion: Sender<()>) -> Result<(Self, EventStream)> {
        config.validate()?;
        let channel = FanotifyChannel::from_config(&config)?;
        Ok(Self::with_channel(channel, config, completion))
    }
}

impl<C: NotifyChannel + 'static> Monitor<C> {
    /// Builds an idle monitor around an already open channel.
    pub fn with_channel(channel: C, config: MonitorConfig, completion: Sender<()>) -> (Self, EventStream) {
        let (tx, rx) = mpsc::sync_channel(0);
        let monitor = Self {
            channel: Arc::new(channel),
            shared: Arc::new(Mutex::new(Shared {
                state: MonitorState::Idle,
                watches: BTreeMap::new(),
                completion: Some(completion),
            })),
            procfs: ProcFs::new(config.proc_root.clone()),
            config,
            policy: Box::new(AllowAll),
            sink: Mutex::new(Some(tx)),
            self_pid: getpid().as_raw(),
        };
        (monitor, EventStream { rx })
    }

    /// Replaces the verdict source for permission events.
    #[must_use]
    pub fn with_policy(mut self, policy: impl PermissionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// The channel this monitor reads from.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        lock(&self.shared).state
    }

    /// Snapshot of the watched paths and their masks.
    pub fn watches(&self) -> BTreeMap<PathBuf, EventMask> {
        lock(&self.shared).watches.clone()
    }

    /// Starts watching `path` for the events in `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::InvalidState`] once close was requested,
    /// [`FanwatchError::DuplicateWatch`] if `path` is already watched, or
    /// the channel's mark error. The watch map is only updated on success.
    pub fn add_watch(&self, path: impl AsRef<Path>, mask: EventMask) -> Result<()> {
        let path = path.as_ref();
        let mut shared = lock(&self.shared);
        match shared.state {
            MonitorState::Idle | MonitorState::Running => {}
            state => {
                return Err(FanwatchError::InvalidState {
                    operation: "add watch",
                    state: state.to_string(),
                });
            }
        }
        if shared.watches.contains_key(path) {
            return Err(FanwatchError::DuplicateWatch {
                path: path.to_path_buf(),
            });
        }

        self.channel.mark(MarkOp::Add, mask, path)?;
        let _ = shared.watches.insert(path.to_path_buf(), mask);
        tracing::info!(path = %path.display(), %mask, "watch added");
        Ok(())
    }

    /// Stops watching `path`.
    ///
    /// Returns `false` if the path was not being watched. The path is
    /// forgotten even when removing the mark fails.
    ///
    /// # Errors
    ///
    /// Returns the channel's mark error.
    pub fn remove_watch(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let mut shared = lock(&self.shared);
        let Some(mask) = shared.watches.remove(path) else {
            return Ok(false);
        };
        self.channel.mark(MarkOp::Remove, mask, path)?;
        tracing::info!(path = %path.display(), "watch removed");
        Ok(true)
    }

    /// Removes every watch and returns the failures, one per path.
    ///
    /// The watch map is empty afterwards whatever the outcome.
    pub fn remove_all_watches(&self) -> Vec<FanwatchError> {
        let mut shared = lock(&self.shared);
        let watches = std::mem::take(&mut shared.watches);
        let total = watches.len();

        let failures: Vec<_> = watches
            .into_iter()
            .filter_map(|(path, mask)| {
                self.channel
                    .mark(MarkOp::Remove, mask, &path)
                    .err()
                    .inspect(|e| tracing::warn!(path = %path.display(), error = %e, "failed to remove watch"))
            })
            .collect();
        tracing::info!(total, failed = failures.len(), "watches removed");
        failures
    }

    /// Runs the event loop on the calling thread until the monitor closes.
    ///
    /// The channel is released and completion signalled before this
    /// returns, whichever way the loop ended.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::InvalidState`] if the loop was already
    /// started or the monitor is closed, and the channel error that
    /// ended the loop if polling or reading failed.
    pub fn run(&self) -> Result<()> {
        {
            let mut shared = lock(&self.shared);
            if shared.state != MonitorState::Idle {
                return Err(FanwatchError::InvalidState {
                    operation: "run",
                    state: shared.state.to_string(),
                });
            }
            shared.state = MonitorState::Running;
        }
        tracing::info!(
            poll_timeout_ms = self.config.poll_timeout_ms,
            drain_timeouts = self.config.drain_timeouts,
            "event loop started"
        );

        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner).take();
        let result = self.event_loop(sink.as_ref());
        drop(sink);
        finish(self.channel.as_ref(), &self.shared);

        if let Err(e) = &result {
            tracing::error!(error = %e, "event loop terminated");
        }
        result
    }

    fn event_loop(&self, sink: Option<&SyncSender<FileEvent>>) -> Result<()> {
        let mut quiet_timeouts = 0u32;
        loop {
            if self.state() == MonitorState::Closed {
                return Ok(());
            }

            match self.channel.wait_readable(self.config.poll_timeout()) {
                Ok(PollOutcome::Interrupted) => {}
                Ok(PollOutcome::TimedOut) => {
                    if self.state() == MonitorState::Draining {
                        quiet_timeouts += 1;
                        if quiet_timeouts >= self.config.drain_timeouts {
                            tracing::debug!(quiet_timeouts, "queue drained");
                            return Ok(());
                        }
                    }
                }
                Ok(PollOutcome::Ready) => {
                    let events = match self.channel.read_events() {
                        Ok(events) => events,
                        Err(FanwatchError::ChannelClosed) => return Ok(()),
                        Err(e) => return Err(e),
                    };
                    for event in events {
                        self.dispatch(event, sink);
                    }
                    quiet_timeouts = 0;
                }
                Err(FanwatchError::ChannelClosed) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Delivers one event, answers it if required, then releases it.
    fn dispatch(&self, event: Event, sink: Option<&SyncSender<FileEvent>>) {
        // Our own lookups open files; waiting on them would block the loop on itself.
        if event.pid() == self.self_pid {
            if event.requires_response() {
                if let Err(e) = self.channel.respond(&event, Decision::Allow) {
                    tracing::warn!(error = %e, "failed to allow own access");
                }
            }
            tracing::trace!(mask = %event.mask(), "own access skipped");
            return;
        }

        let process = self.procfs.resolve(event.pid());
        let path = event
            .file()
            .and_then(|file| self.procfs.resolve_fd_path(file.as_raw_fd()));
        let file_event = FileEvent {
            timestamp: Utc::now(),
            mask: event.mask(),
            path,
            process,
        };
        let decision = event
            .requires_response()
            .then(|| self.policy.decide(&file_event));

        if let Some(sink) = sink {
            if sink.send(file_event).is_err() {
                tracing::debug!(pid = event.pid(), "event stream dropped, event discarded");
            }
        }

        if let Some(decision) = decision {
            if let Err(e) = self.channel.respond(&event, decision) {
                tracing::warn!(pid = event.pid(), error = %e, "permission response failed");
            }
        }
        drop(event);
    }

    /// Asks the loop to stop once the queue is quiet.
    ///
    /// A running monitor starts draining and a timer forces it closed
    /// after the configured grace period. An idle monitor closes at once.
    /// Repeated calls have no further effect.
    pub fn request_close(&self) {
        let mut shared = lock(&self.shared);
        let state = shared.state;
        match state {
            MonitorState::Idle => {
                drop(shared);
                self.close();
            }
            MonitorState::Running => {
                shared.state = MonitorState::Draining;
                drop(shared);
                tracing::info!(grace_ms = self.config.close_grace_ms, "close requested, draining");
                self.arm_backstop();
            }
            MonitorState::Draining | MonitorState::Closed => {}
        }
    }

    fn arm_backstop(&self) {
        let channel = Arc::clone(&self.channel);
        let shared = Arc::clone(&self.shared);
        let grace = self.config.close_grace();
        let grace_ms = self.config.close_grace_ms;

        let spawned = std::thread::Builder::new()
            .name("fanwatch-close".into())
            .spawn(move || {
                std::thread::sleep(grace);
                if lock(&shared).state != MonitorState::Closed {
                    tracing::warn!(grace_ms, "event loop did not drain in time, forcing close");
                    finish(channel.as_ref(), &shared);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start close timer, closing now");
            finish(self.channel.as_ref(), &self.shared);
        }
    }

    /// Releases the channel and signals completion. Idempotent.
    pub fn close(&self) {
        drop(self.sink.lock().unwrap_or_else(PoisonError::into_inner).take());
        finish(self.channel.as_ref(), &self.shared);
    }
}
