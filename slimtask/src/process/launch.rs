//! Lightweight fork+exec.
//!
//! Unlike `std::process::Command` or tokio's process support, nothing here
//! registers a SIGCHLD handler, a reaper thread or any other notification: the
//! parent just gets a pid back. Exec failures are not reported through a
//! side channel either; the child exits with [`EXEC_FAILURE_STATUS`] and the
//! parent sees that as an ordinary exit.

use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
use nix::fcntl::OFlag;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::{chdir, dup2, fork, ForkResult};
use tracing::debug;

use super::error::LaunchError;
use super::handle::ChildProcessHandle;
use super::spec::{ExecImage, ProcessSpec};

/// Exit status of a child whose exec (or pre-exec setup) failed.
pub const EXEC_FAILURE_STATUS: i32 = 127;

const STDOUT_FILENO: i32 = 1;

/// Fork and exec `spec`, returning a running handle.
///
/// Everything the child needs is prepared before the fork, so the child only
/// redirects stdout (when capture was requested), changes directory and execs.
pub fn launch(spec: &ProcessSpec) -> Result<ChildProcessHandle, LaunchError> {
    let image = ExecImage::prepare(spec)?;

    let stdout_pipe = if spec.capture_stdout {
        Some(cloexec_pipe().map_err(LaunchError::Pipe)?)
    } else {
        None
    };

    // SAFETY: the child only calls dup2, chdir, execve and _exit before the
    // image is replaced; none of them rely on state owned by other threads.
    #[allow(unsafe_code)]
    let forked = unsafe { fork() }.map_err(LaunchError::Fork)?;

    match forked {
        ForkResult::Child => run_child(&image, stdout_pipe.as_ref().map(|(_, write)| write)),
        ForkResult::Parent { child } => {
            debug!(pid = %child, path = %image.path().display(), "launched child");

            // Dropping the write end leaves the child as the only writer, so
            // reads see EOF once it exits.
            let stdout = stdout_pipe.map(|(read, _write)| File::from(read));

            let mut handle = ChildProcessHandle::new();
            handle.mark_running(child, stdout);
            Ok(handle)
        }
    }
}

/// Child side of [`launch`]. Never returns.
fn run_child(image: &ExecImage, stdout: Option<&OwnedFd>) -> ! {
    if let Some(fd) = stdout {
        if dup2(fd.as_raw_fd(), STDOUT_FILENO).is_err() {
            exit_child();
        }
    }

    if let Some(dir) = image.working_dir() {
        if chdir(dir).is_err() {
            exit_child();
        }
    }

    let _ = image.exec();
    exit_child()
}

#[allow(unsafe_code)]
fn exit_child() -> ! {
    // SAFETY: _exit skips atexit handlers and stdio flushing, which belong to
    // the parent's image and must not run twice.
    unsafe { nix::libc::_exit(EXEC_FAILURE_STATUS) }
}

/// A pipe whose ends are closed on exec. `dup2` clears the flag on the copy
/// installed as the child's stdout.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC)
}

/// A pipe whose ends are closed on exec. Without `pipe2` the flag is set in a
/// second step, so a concurrent fork from another thread may inherit the ends.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}
