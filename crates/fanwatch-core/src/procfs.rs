//! Process identity lookups through the proc filesystem.
//!
//! Every lookup is independent and racy: the process behind an event may
//! exit at any moment, so a missing file is reported as
//! [`FanwatchError::ProcessNotFound`] and callers carry on with whatever
//! fields they did get.

use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use fanwatch_common::constants::{
    DEFAULT_PROC_ROOT, DELETED_EXE_SUFFIX, GENERIC_EXEC_NAME, MAX_STATUS_NAME_LEN,
    NAME_SEPARATORS,
};
use fanwatch_common::error::{FanwatchError, Result};
use fanwatch_common::types::ProcessInfo;
use nix::unistd::{Uid, User};

/// Fields of interest parsed from `/proc/<pid>/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFields {
    /// `Name:` value, cut at the first separator.
    pub name: Option<String>,
    /// `PPid:` value.
    pub ppid: Option<i32>,
    /// Effective uid from the `Uid:` line.
    pub euid: Option<u32>,
}

/// Parses the `Name:`, `PPid:`, and `Uid:` lines of a status file.
#[must_use]
pub fn parse_status(status: &str) -> StatusFields {
    let mut fields = StatusFields::default();
    for line in status.lines() {
        if let Some(raw) = line.strip_prefix("Name:\t") {
            fields.name = Some(cut_name(raw).to_owned());
        } else if let Some(raw) = line.strip_prefix("PPid:\t") {
            fields.ppid = raw.trim().parse().ok();
        } else if let Some(raw) = line.strip_prefix("Uid:\t") {
            // real, effective, saved, filesystem
            fields.euid = raw.split_whitespace().nth(1).and_then(|s| s.parse().ok());
        }
    }
    fields
}

fn cut_name(raw: &str) -> &str {
    match raw.find(NAME_SEPARATORS) {
        Some(i) if i > 0 => &raw[..i],
        _ => raw,
    }
}

/// Splits a NUL-separated `cmdline` record into arguments.
#[must_use]
pub fn split_cmdline(raw: &[u8]) -> Vec<String> {
    let mut args: Vec<String> = raw
        .split(|b| *b == 0)
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect();
    if args.last().is_some_and(String::is_empty) {
        let _ = args.pop();
    }
    args
}

/// Removes the marker the kernel appends to the `exe` link of a deleted binary.
#[must_use]
pub fn strip_deleted_suffix(target: &str) -> &str {
    target.strip_suffix(DELETED_EXE_SUFFIX).unwrap_or(target)
}

fn needs_cmdline_name(name: &str) -> bool {
    name == GENERIC_EXEC_NAME || name.len() == MAX_STATUS_NAME_LEN
}

fn base_name(arg: &str) -> String {
    Path::new(arg)
        .file_name()
        .map_or_else(|| arg.to_owned(), |n| n.to_string_lossy().into_owned())
}

/// Resolver for process metadata under a proc filesystem root.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcFs {
    /// Creates a resolver reading from `root` (normally `/proc`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry(&self, pid: i32, leaf: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(leaf)
    }

    fn lookup_error(pid: i32, what: &'static str, path: PathBuf, err: io::Error) -> FanwatchError {
        if err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ESRCH) {
            FanwatchError::ProcessNotFound { pid, what }
        } else {
            FanwatchError::Io { path, source: err }
        }
    }

    fn read_status(&self, pid: i32) -> Result<StatusFields> {
        let path = self.entry(pid, "status");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Self::lookup_error(pid, "status", path, e))?;
        Ok(parse_status(&content))
    }

    /// Returns the short executable name and parent pid of `pid`.
    ///
    /// A name of `exec`, or one exactly at the kernel's truncation length,
    /// is replaced by the base name of the first command-line argument
    /// when there is one.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::ProcessNotFound`] if the status file is
    /// gone or has no `PPid:` line.
    pub fn resolve_name(&self, pid: i32) -> Result<(String, i32)> {
        let fields = self.read_status(pid)?;
        let ppid = fields
            .ppid
            .ok_or(FanwatchError::ProcessNotFound { pid, what: "PPid" })?;
        let mut name = fields.name.unwrap_or_default();

        if needs_cmdline_name(&name) {
            if let Ok(args) = self.resolve_command_line(pid) {
                if let Some(first) = args.first().filter(|a| !a.is_empty()) {
                    name = base_name(first);
                }
            }
        }
        Ok((name, ppid))
    }

    /// Returns the command-line arguments of `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::ProcessNotFound`] if the process is gone.
    pub fn resolve_command_line(&self, pid: i32) -> Result<Vec<String>> {
        let path = self.entry(pid, "cmdline");
        let raw = std::fs::read(&path).map_err(|e| Self::lookup_error(pid, "cmdline", path, e))?;
        Ok(split_cmdline(&raw))
    }

    /// Returns the absolute path of the executable of `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::ProcessNotFound`] if the process is gone.
    pub fn resolve_executable_path(&self, pid: i32) -> Result<String> {
        let path = self.entry(pid, "exe");
        let target =
            std::fs::read_link(&path).map_err(|e| Self::lookup_error(pid, "exe", path, e))?;
        Ok(strip_deleted_suffix(&target.to_string_lossy()).to_owned())
    }

    /// Returns the effective uid of `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`FanwatchError::ProcessNotFound`] if the process is gone
    /// or its status has no `Uid:` line.
    pub fn resolve_effective_uid(&self, pid: i32) -> Result<u32> {
        self.read_status(pid)?
            .euid
            .ok_or(FanwatchError::ProcessNotFound { pid, what: "Uid" })
    }

    /// Returns the path of the file behind one of our own descriptors.
    #[must_use]
    pub fn resolve_fd_path(&self, fd: RawFd) -> Option<PathBuf> {
        std::fs::read_link(self.root.join("self").join("fd").join(fd.to_string())).ok()
    }

    /// Gathers everything known about `pid` and its parent.
    ///
    /// Each lookup runs regardless of whether the others failed.
    #[must_use]
    pub fn resolve(&self, pid: i32) -> ProcessInfo {
        let mut info = ProcessInfo::new(pid);

        match self.resolve_name(pid) {
            Ok((name, ppid)) => {
                info.name = Some(name);
                info.ppid = Some(ppid);
            }
            Err(e) => log_lookup_failure(pid, "name", &e),
        }
        match self.resolve_executable_path(pid) {
            Ok(path) => info.path = Some(path),
            Err(e) => log_lookup_failure(pid, "exe", &e),
        }
        match self.resolve_command_line(pid) {
            Ok(args) => info.cmdline = args,
            Err(e) => log_lookup_failure(pid, "cmdline", &e),
        }
        match self.resolve_effective_uid(pid) {
            Ok(uid) => {
                info.euid = Some(uid);
                info.user = user_name(uid);
            }
            Err(e) => log_lookup_failure(pid, "uid", &e),
        }

        if let Some(ppid) = info.ppid.filter(|p| *p > 0) {
            info.parent_name = self.resolve_name(ppid).ok().map(|(name, _)| name);
            info.parent_path = self.resolve_executable_path(ppid).ok();
        }
        info
    }
}

fn user_name(uid: u32) -> Option<String> {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(user) => user.map(|u| u.name),
        Err(e) => {
            tracing::debug!(uid, error = %e, "user lookup failed");
            None
        }
    }
}

fn log_lookup_failure(pid: i32, field: &'static str, err: &FanwatchError) {
    if err.is_process_gone() {
        tracing::debug!(pid, field, "process exited before lookup");
    } else {
        tracing::warn!(pid, field, error = %err, "process lookup failed");
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use super::*;

    struct FakeProc {
        dir: tempfile::TempDir,
    }

    impl FakeProc {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().expect("tempdir"),
            }
        }

        fn procfs(&self) -> ProcFs {
            ProcFs::new(self.dir.path())
        }

        fn process(&self, pid: i32, status: &str, cmdline: &[u8], exe: Option<&str>) {
            let dir = self.dir.path().join(pid.to_string());
            std::fs::create_dir_all(&dir).expect("mkdir");
            std::fs::write(dir.join("status"), status).expect("status");
            std::fs::write(dir.join("cmdline"), cmdline).expect("cmdline");
            if let Some(target) = exe {
                symlink(target, dir.join("exe")).expect("exe link");
            }
        }
    }

    #[test]
    fn resolve_name_reads_name_and_ppid() {
        let proc = FakeProc::new();
        proc.process(
            200,
            "Name:\tbash\nUmask:\t0022\nState:\tS (sleeping)\nPPid:\t123\n",
            b"bash\0",
            None,
        );
        let (name, ppid) = proc.procfs().resolve_name(200).expect("resolve");
        assert_eq!(name, "bash");
        assert_eq!(ppid, 123);
    }

    #[test]
    fn resolve_name_cuts_at_separator() {
        let proc = FakeProc::new();
        proc.process(201, "Name:\tkworker/0:1\nPPid:\t2\n", b"", None);
        let (name, _) = proc.procfs().resolve_name(201).expect("resolve");
        assert_eq!(name, "kworker");
    }

    #[test]
    fn resolve_name_keeps_leading_separator() {
        assert_eq!(cut_name("/weird"), "/weird");
    }

    #[test]
    fn truncated_name_is_replaced_from_cmdline() {
        let proc = FakeProc::new();
        proc.process(
            202,
            "Name:\tsystemd-journal\nPPid:\t1\n",
            b"/usr/lib/systemd/systemd-journald\0",
            None,
        );
        let (name, _) = proc.procfs().resolve_name(202).expect("resolve");
        assert_eq!(name, "systemd-journald");
    }

    #[test]
    fn exec_placeholder_is_replaced_from_cmdline() {
        let proc = FakeProc::new();
        proc.process(203, "Name:\texec\nPPid:\t1\n", b"/opt/app/server\0--port\08080\0", None);
        let (name, _) = proc.procfs().resolve_name(203).expect("resolve");
        assert_eq!(name, "server");
    }

    #[test]
    fn truncated_name_kept_when_cmdline_empty() {
        let proc = FakeProc::new();
        proc.process(204, "Name:\tabcdefghijklmno\nPPid:\t1\n", b"", None);
        let (name, _) = proc.procfs().resolve_name(204).expect("resolve");
        assert_eq!(name, "abcdefghijklmno");
    }

    #[test]
    fn missing_ppid_is_not_found() {
        let proc = FakeProc::new();
        proc.process(205, "Name:\tbash\n", b"bash\0", None);
        let err = proc.procfs().resolve_name(205).expect_err("no PPid");
        assert!(err.is_process_gone());
    }

    #[test]
    fn vanished_process_is_not_found() {
        let proc = FakeProc::new();
        let procfs = proc.procfs();
        assert!(procfs.resolve_name(999).expect_err("gone").is_process_gone());
        assert!(procfs.resolve_command_line(999).expect_err("gone").is_process_gone());
        assert!(procfs.resolve_executable_path(999).expect_err("gone").is_process_gone());
    }

    #[test]
    fn cmdline_drops_trailing_separator_artifact() {
        assert_eq!(split_cmdline(b"ls\0-la\0/tmp\0"), vec!["ls", "-la", "/tmp"]);
        assert_eq!(split_cmdline(b"sh\0\0x\0"), vec!["sh", "", "x"]);
        assert!(split_cmdline(b"").is_empty());
    }

    #[test]
    fn deleted_executable_path_is_cleaned() {
        let proc = FakeProc::new();
        proc.process(206, "Name:\tbusybox\nPPid:\t1\n", b"", Some("/bin/busybox (deleted)"));
        let path = proc.procfs().resolve_executable_path(206).expect("exe");
        assert_eq!(path, "/bin/busybox");
    }

    #[test]
    fn strip_deleted_suffix_only_touches_suffix() {
        assert_eq!(strip_deleted_suffix("/usr/bin/ted"), "/usr/bin/ted");
        assert_eq!(strip_deleted_suffix("/usr/bin/vi (deleted)"), "/usr/bin/vi");
    }

    #[test]
    fn parse_status_reads_effective_uid() {
        let fields = parse_status("Name:\tsu\nPPid:\t9\nUid:\t1000\t0\t0\t0\n");
        assert_eq!(fields.euid, Some(0));
        assert_eq!(fields.ppid, Some(9));
    }

    #[test]
    fn resolve_fills_parent_fields() {
        let proc = FakeProc::new();
        proc.process(
            300,
            "Name:\tvim\nPPid:\t301\nUid:\t1000\t1000\t1000\t1000\n",
            b"vim\0notes.txt\0",
            Some("/usr/bin/vim"),
        );
        proc.process(301, "Name:\tzsh\nPPid:\t1\n", b"-zsh\0", Some("/usr/bin/zsh"));

        let info = proc.procfs().resolve(300);
        assert_eq!(info.pid, 300);
        assert_eq!(info.name.as_deref(), Some("vim"));
        assert_eq!(info.path.as_deref(), Some("/usr/bin/vim"));
        assert_eq!(info.cmdline, vec!["vim", "notes.txt"]);
        assert_eq!(info.euid, Some(1000));
        assert_eq!(info.ppid, Some(301));
        assert_eq!(info.parent_name.as_deref(), Some("zsh"));
        assert_eq!(info.parent_path.as_deref(), Some("/usr/bin/zsh"));
    }

    #[test]
    fn resolve_tolerates_partial_metadata() {
        let proc = FakeProc::new();
        proc.process(400, "Name:\tcat\nPPid:\t999\n", b"cat\0", None);

        let info = proc.procfs().resolve(400);
        assert_eq!(info.name.as_deref(), Some("cat"));
        assert!(info.path.is_none());
        assert_eq!(info.ppid, Some(999));
        assert!(info.parent_name.is_none());
        assert!(info.parent_path.is_none());
    }

    #[test]
    fn resolve_of_vanished_process_keeps_pid() {
        let proc = FakeProc::new();
        let info = proc.procfs().resolve(12345);
        assert_eq!(info, ProcessInfo::new(12345));
    }
}
