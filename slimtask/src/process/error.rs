//! Errors surfaced by launch, exec and wait.

use std::path::PathBuf;

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

use super::spec::SpecError;

/// Failure to start a child process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The spec could not be converted for exec.
    #[error(transparent)]
    InvalidSpec(#[from] SpecError),

    /// `fork` failed, typically from process or memory exhaustion.
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),

    /// The stdout capture pipe could not be created.
    #[error("failed to set up stdout pipe: {0}")]
    Pipe(#[source] Errno),

    /// The owner already has a child that has not been reaped.
    #[error("a child process (pid {pid}) is still running")]
    Busy {
        /// Pid of the running child.
        pid: Pid,
    },
}

/// Failure to replace the current process image.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The spec could not be converted for exec.
    #[error(transparent)]
    InvalidSpec(#[from] SpecError),

    /// `execve` returned.
    #[error("failed to exec {}: {source}{}", .path.display(), thread_note(.threads))]
    Exec {
        /// Executable that was requested.
        path: PathBuf,
        /// Error reported by `execve`.
        #[source]
        source: Errno,
        /// Live threads at the time of the call, where the platform exposes it.
        threads: Option<usize>,
    },
}

fn thread_note(threads: &Option<usize>) -> String {
    match *threads {
        Some(count) if count > 1 => format!(" (process has {count} threads, exec expects 1)"),
        _ => String::new(),
    }
}

/// Failure to collect a child's termination status.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The handle was never launched.
    #[error("no child process has been launched")]
    NotStarted,

    /// `waitpid` refused the pid, e.g. it was already reaped or is not ours.
    #[error("waitpid({pid}) failed: {source}")]
    Wait {
        /// Pid that was waited on.
        pid: Pid,
        /// Error reported by `waitpid`.
        #[source]
        source: Errno,
    },
}
