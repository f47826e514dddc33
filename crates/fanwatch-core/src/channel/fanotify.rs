//! fanotify group backed by a real kernel descriptor.

use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use fanwatch_common::config::MonitorConfig;
use fanwatch_common::constants::EVENT_METADATA_LEN;
use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::types::{Decision, EventMask, InitFlags, MarkOp};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use super::{NotifyChannel, PollOutcome, wire};
use crate::event::Event;

/// An open fanotify group.
///
/// Owns the group descriptor and a read buffer sized for many records.
/// The descriptor sits behind a lock so [`NotifyChannel::close`] can
/// release it while other threads still hold the channel.
#[derive(Debug)]
pub struct FanotifyChannel {
    file: RwLock<Option<File>>,
    buffer: Mutex<Vec<u8>>,
}

impl FanotifyChannel {
    /// Creates a fanotify group with `fanotify_init(2)`.
    ///
    /// `event_file_flags` are the `open(2)` flags used for the descriptors
    /// the kernel attaches to each event. The read buffer is `buffer_len`
    /// bytes, rounded up to at least one record.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::PermissionDenied`] without
    /// `CAP_SYS_ADMIN`, [`FanwatchError::UnsupportedKernel`] if fanotify
    /// or one of the flags is unavailable, and [`FanwatchError::Init`]
    /// otherwise.
    #[allow(unsafe_code)]
    pub fn open(
        init_flags: InitFlags,
        event_file_flags: u32,
        buffer_len: usize,
    ) -> Result<Self> {
        // SAFETY: fanotify_init takes two integer arguments and has no
        // memory-safety preconditions.
        let fd = unsafe { libc::fanotify_init(init_flags.bits(), event_file_flags) };
        if fd < 0 {
            return Err(init_error(io::Error::last_os_error()));
        }
        // SAFETY: fanotify_init returned a fresh descriptor owned by nobody else.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        tracing::debug!(fd, flags = ?init_flags, "fanotify group created");

        let len = buffer_len.max(EVENT_METADATA_LEN);
        Ok(Self {
            file: RwLock::new(Some(File::from(owned))),
            buffer: Mutex::new(vec![0u8; len]),
        })
    }

    /// Creates a fanotify group using the flags and buffer size in `config`.
    ///
    /// # Errors
    ///
    /// See [`FanotifyChannel::open`].
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Self::open(
            config.init_flags,
            config.event_file_flags,
            config.read_buffer_len(),
        )
    }

    /// Installs or removes a mark on `path`.
    ///
    /// Relative paths resolve against the current working directory.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::Mark`] with the kernel's `errno`, or
    /// [`FanwatchError::ChannelClosed`] after [`NotifyChannel::close`].
    #[allow(unsafe_code)]
    fn mark_path(&self, op: MarkOp, mask: EventMask, path: &Path) -> Result<()> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| FanwatchError::Mark {
            path: path.to_path_buf(),
            errno: libc::EINVAL,
        })?;
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        let file = guard.as_ref().ok_or(FanwatchError::ChannelClosed)?;

        // SAFETY: the group descriptor is open while the read guard is held
        // and `c_path` is a valid NUL-terminated string for the whole call.
        let ret = unsafe {
            libc::fanotify_mark(
                file.as_raw_fd(),
                op.flags().bits(),
                mask.bits(),
                libc::AT_FDCWD,
                c_path.as_ptr(),
            )
        };
        if ret < 0 {
            let errno = Errno::last_raw();
            tracing::debug!(path = %path.display(), %op, errno, "fanotify_mark failed");
            return Err(FanwatchError::Mark {
                path: path.to_path_buf(),
                errno,
            });
        }
        tracing::debug!(path = %path.display(), %op, %mask, "mark updated");
        Ok(())
    }
}

fn init_error(err: io::Error) -> FanwatchError {
    match err.raw_os_error() {
        Some(libc::EPERM) => FanwatchError::PermissionDenied {
            message: format!("fanotify_init requires CAP_SYS_ADMIN: {err}"),
        },
        Some(libc::ENOSYS | libc::EINVAL) => FanwatchError::UnsupportedKernel {
            message: err.to_string(),
        },
        _ => FanwatchError::Init { source: err },
    }
}

impl NotifyChannel for FanotifyChannel {
    fn mark(&self, op: MarkOp, mask: EventMask, path: &Path) -> Result<()> {
        self.mark_path(op, mask, path)
    }

    fn wait_readable(&self, timeout: Duration) -> Result<PollOutcome> {
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        let file = guard.as_ref().ok_or(FanwatchError::ChannelClosed)?;
        let timeout = PollTimeout::try_from(timeout).unwrap_or(PollTimeout::MAX);

        let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, timeout) {
            Ok(0) => Ok(PollOutcome::TimedOut),
            Ok(_) => {
                let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
                if revents.contains(PollFlags::POLLIN) {
                    Ok(PollOutcome::Ready)
                } else {
                    Err(FanwatchError::Read {
                        source: io::Error::other(format!("channel poll reported {revents:?}")),
                    })
                }
            }
            Err(Errno::EINTR) => Ok(PollOutcome::Interrupted),
            Err(errno) => Err(FanwatchError::Read {
                source: io::Error::from(errno),
            }),
        }
    }

    #[allow(unsafe_code)]
    fn read_events(&self) -> Result<Vec<Event>> {
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        let mut file: &File = guard.as_ref().ok_or(FanwatchError::ChannelClosed)?;
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);

        let n = loop {
            match file.read(&mut buffer[..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(FanwatchError::Read { source: e }),
            }
        };
        if n == 0 {
            return Err(FanwatchError::Read {
                source: io::Error::from(io::ErrorKind::UnexpectedEof),
            });
        }

        let events = wire::decode_batch(&buffer[..n])
            .into_iter()
            // SAFETY: the metadata was just read from our fanotify group,
            // which installed its descriptor for us alone.
            .map(|metadata| unsafe { Event::from_wire(metadata) })
            .collect::<Vec<_>>();
        tracing::trace!(bytes = n, events = events.len(), "read event batch");
        Ok(events)
    }

    fn respond(&self, event: &Event, decision: Decision) -> Result<()> {
        let guard = self.file.read().unwrap_or_else(PoisonError::into_inner);
        let mut file: &File = guard.as_ref().ok_or(FanwatchError::ChannelClosed)?;
        let record = wire::encode_response(event.fd(), decision);

        file.write_all(&record)
            .map_err(|e| FanwatchError::ResponseWrite {
                fd: event.fd(),
                source: e,
            })?;
        tracing::debug!(fd = event.fd(), pid = event.pid(), %decision, "permission answered");
        Ok(())
    }

    fn close(&self) {
        let released = self
            .file
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            tracing::debug!("fanotify group released");
        }
    }

    fn is_closed(&self) -> bool {
        self.file
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
