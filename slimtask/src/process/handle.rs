//! Child process handle and its lifecycle state.

use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::warn;

/// Lifecycle state of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// No process has been forked yet.
    #[default]
    NotStarted,
    /// Forked and not yet reaped.
    Running,
    /// Exited normally with the given code.
    Exited(i32),
    /// Terminated by the given signal number.
    ///
    /// Kept as a raw number so real-time signals survive.
    Signaled(i32),
}

impl ProcessState {
    /// Convert state to a short label for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::Running => "running",
            Self::Exited(_) => "exited",
            Self::Signaled(_) => "signaled",
        }
    }

    /// Whether the process has terminated.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited(_) | Self::Signaled(_))
    }

    /// Exit code for a normal exit, signal number for a signal death.
    pub const fn termination_status(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(signal) => Some(signal),
            Self::NotStarted | Self::Running => None,
        }
    }

    /// True only for `Exited(0)`.
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// The terminating signal, if it is one `nix` knows by name.
    pub fn signal(self) -> Option<Signal> {
        match self {
            Self::Signaled(signal) => Signal::try_from(signal).ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "{} ({code})", self.as_str()),
            Self::Signaled(number) => match self.signal() {
                Some(signal) => write!(f, "{} ({signal})", self.as_str()),
                None => write!(f, "{} (signal {number})", self.as_str()),
            },
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Identity and termination state of one spawned process.
///
/// The pid is assigned once, when the fork succeeds, and the state only moves
/// forward: `NotStarted -> Running -> Exited | Signaled`. A handle dropped while
/// `Running` leaves the child unreaped and logs a warning.
#[derive(Debug, Default)]
pub struct ChildProcessHandle {
    pid: Option<Pid>,
    state: ProcessState,
    raw_status: Option<i32>,
    stdout: Option<File>,
}

impl ChildProcessHandle {
    /// A handle that has not been launched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process id, set iff the handle left `NotStarted`.
    pub const fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Current state.
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// Whether the child has been forked and not yet reaped.
    pub const fn is_running(&self) -> bool {
        matches!(self.state, ProcessState::Running)
    }

    /// The wait-status word in the conventional POSIX encoding.
    pub const fn raw_status(&self) -> Option<i32> {
        self.raw_status
    }

    /// The termination status as a standard library value.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.raw_status.map(ExitStatus::from_raw)
    }

    /// Read end of the captured stdout pipe, if capture was requested.
    pub fn take_stdout(&mut self) -> Option<File> {
        self.stdout.take()
    }

    pub(crate) fn mark_running(&mut self, pid: Pid, stdout: Option<File>) {
        debug_assert!(matches!(self.state, ProcessState::NotStarted));
        self.pid = Some(pid);
        self.state = ProcessState::Running;
        self.stdout = stdout;
    }

    /// Apply a raw status word reported by `waitpid`. Returns the terminal
    /// state for exits and signal deaths; stop and continue reports leave the
    /// handle running.
    pub(crate) fn record(&mut self, raw: i32) -> Option<ProcessState> {
        if self.state.is_terminal() {
            return Some(self.state);
        }

        let status = ExitStatus::from_raw(raw);
        let state = match (status.code(), status.signal()) {
            (Some(code), _) => ProcessState::Exited(code),
            (None, Some(signal)) => ProcessState::Signaled(signal),
            (None, None) => return None,
        };

        self.state = state;
        self.raw_status = Some(raw);
        Some(state)
    }
}

impl Drop for ChildProcessHandle {
    fn drop(&mut self) {
        if let (ProcessState::Running, Some(pid)) = (self.state, self.pid) {
            warn!(%pid, "dropping handle of an unreaped child");
        }
    }
}
