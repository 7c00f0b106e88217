//! Blocking and interleaved waits for a launched child.

use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::wait::WaitPidFlag;
use nix::unistd::Pid;
use tracing::{debug, trace};

use super::error::WaitError;
use super::handle::{ChildProcessHandle, ProcessState};
use crate::runloop::{PassOutcome, RunLoop, RunLoopMode};

/// Default length of one event-loop pass in [`wait_interleaved`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Block until the child terminates and record its status.
///
/// On a handle that already terminated this returns the recorded state
/// without calling `waitpid` again: the pid has been reaped and may belong to
/// someone else by now.
pub fn wait(handle: &mut ChildProcessHandle) -> Result<ProcessState, WaitError> {
    let pid = match running_pid(handle)? {
        Ok(pid) => pid,
        Err(state) => return Ok(state),
    };

    loop {
        let Some(status) = reap(pid, WaitPidFlag::empty())? else {
            continue;
        };
        if let Some(state) = handle.record(status) {
            debug!(%pid, %state, "child reaped");
            return Ok(state);
        }
    }
}

/// Probe the child without blocking.
///
/// Returns `Ok(None)` while it is still running.
pub fn try_wait(handle: &mut ChildProcessHandle) -> Result<Option<ProcessState>, WaitError> {
    let pid = match running_pid(handle)? {
        Ok(pid) => pid,
        Err(state) => return Ok(Some(state)),
    };

    match reap(pid, WaitPidFlag::WNOHANG)? {
        None => Ok(None),
        Some(status) => {
            let state = handle.record(status);
            if let Some(state) = state {
                debug!(%pid, %state, "child reaped");
            }
            Ok(state)
        }
    }
}

/// Wait for the child while servicing `run_loop` on the calling thread.
///
/// Alternates a non-blocking probe with one pass of the run loop in `mode`,
/// each pass bounded by `interval`, until the probe sees the child terminate.
/// No pass runs after termination has been observed.
///
/// Termination is only noticed between passes. A run loop whose pass ignores
/// the limit, e.g. because the mode has nothing that could time out, delays
/// the result until that pass returns. When a pass reports
/// [`PassOutcome::Finished`] the rest of the interval is slept away so the loop
/// does not spin.
pub fn wait_interleaved<R>(
    handle: &mut ChildProcessHandle,
    run_loop: &mut R,
    mode: &RunLoopMode,
    interval: Duration,
) -> Result<ProcessState, WaitError>
where
    R: RunLoop + ?Sized,
{
    let mut passes: u64 = 0;

    loop {
        if let Some(state) = try_wait(handle)? {
            debug!(%state, passes, %mode, "interleaved wait finished");
            return Ok(state);
        }

        let started = Instant::now();
        let outcome = run_loop.run_pass(mode, interval);
        passes += 1;
        trace!(?outcome, pass = passes, %mode, "run loop pass returned");

        if outcome == PassOutcome::Finished {
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }
}

/// The pid to wait on, or the state to return without touching the OS.
fn running_pid(handle: &ChildProcessHandle) -> Result<Result<Pid, ProcessState>, WaitError> {
    match (handle.state(), handle.pid()) {
        (ProcessState::Running, Some(pid)) => Ok(Ok(pid)),
        (state, _) if state.is_terminal() => Ok(Err(state)),
        _ => Err(WaitError::NotStarted),
    }
}

/// `waitpid` on one pid, retrying when interrupted by a signal.
///
/// Returns the raw status word, or `None` when `WNOHANG` found the child
/// still running. The word must not go through `nix::sys::wait::WaitStatus`:
/// it has no real-time signals and fails only after the child is reaped.
fn reap(pid: Pid, flags: WaitPidFlag) -> Result<Option<i32>, WaitError> {
    let mut status: i32 = 0;
    loop {
        #[allow(unsafe_code)]
        // SAFETY: `status` outlives the call and is only written by it.
        let reaped = unsafe { nix::libc::waitpid(pid.as_raw(), &mut status, flags.bits()) };
        match reaped {
            0 => return Ok(None),
            -1 => match Errno::last() {
                Errno::EINTR => {}
                source => return Err(WaitError::Wait { pid, source }),
            },
            _ => return Ok(Some(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::launch;
    use crate::process::ProcessSpec;
    use nix::sys::signal::{kill, Signal};
    use std::os::unix::process::ExitStatusExt;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("/bin/sh").args(["-c", script])
    }

    #[test]
    fn test_true_exits_zero() {
        let mut handle = launch(&ProcessSpec::new("/bin/true")).unwrap();
        assert_eq!(wait(&mut handle).unwrap(), ProcessState::Exited(0));
    }

    #[test]
    fn test_exit_code() {
        let mut handle = launch(&sh("exit 7")).unwrap();

        assert_eq!(wait(&mut handle).unwrap(), ProcessState::Exited(7));
        assert_eq!(handle.exit_status().unwrap().code(), Some(7));
    }

    #[test]
    fn test_exit_codes_round_trip() {
        for code in [0, 1, 42, 126, 255] {
            let mut handle = launch(&sh(&format!("exit {code}"))).unwrap();
            assert_eq!(wait(&mut handle).unwrap(), ProcessState::Exited(code));
        }
    }

    #[test]
    fn test_signaled_child() {
        let mut handle = launch(&ProcessSpec::new("/bin/sleep").arg("5")).unwrap();
        kill(handle.pid().unwrap(), Signal::SIGTERM).unwrap();

        assert_eq!(
            wait(&mut handle).unwrap(),
            ProcessState::Signaled(Signal::SIGTERM as i32)
        );
        assert_eq!(handle.exit_status().unwrap().signal(), Some(15));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_realtime_signal_is_recorded() {
        let mut handle = launch(&ProcessSpec::new("/bin/sleep").arg("5")).unwrap();
        let pid = handle.pid().unwrap();
        let signal = nix::libc::SIGRTMIN() + 1;

        #[allow(unsafe_code)]
        // SAFETY: plain kill(2) on our own child.
        let sent = unsafe { nix::libc::kill(pid.as_raw(), signal) };
        assert_eq!(sent, 0);

        assert_eq!(wait(&mut handle).unwrap(), ProcessState::Signaled(signal));
        assert_eq!(handle.state().signal(), None);
        assert_eq!(handle.exit_status().unwrap().signal(), Some(signal));
        // The cached state comes back; the pid is gone.
        assert_eq!(wait(&mut handle).unwrap(), ProcessState::Signaled(signal));
    }

    #[test]
    fn test_wait_twice_returns_cached_state() {
        let mut handle = launch(&sh("exit 3")).unwrap();

        let first = wait(&mut handle).unwrap();
        let raw = handle.raw_status();
        // A second waitpid would fail with ECHILD; the cached state comes back.
        let second = wait(&mut handle).unwrap();

        assert_eq!(first, second);
        assert_eq!(raw, handle.raw_status());
    }

    #[test]
    fn test_wait_on_unstarted_handle() {
        let mut handle = ChildProcessHandle::new();
        assert!(matches!(wait(&mut handle), Err(WaitError::NotStarted)));
        assert!(matches!(try_wait(&mut handle), Err(WaitError::NotStarted)));
    }

    #[test]
    fn test_wait_on_foreign_pid() {
        let mut handle = ChildProcessHandle::new();
        // pid 1 exists but is never our child
        handle.mark_running(Pid::from_raw(1), None);

        match wait(&mut handle) {
            Err(WaitError::Wait { source, .. }) => assert_eq!(source, Errno::ECHILD),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(handle.is_running());
    }

    #[test]
    fn test_try_wait_running_then_done() {
        let mut handle = launch(&ProcessSpec::new("/bin/sleep").arg("5")).unwrap();
        assert_eq!(try_wait(&mut handle).unwrap(), None);

        kill(handle.pid().unwrap(), Signal::SIGKILL).unwrap();
        let state = wait(&mut handle).unwrap();

        assert_eq!(state, ProcessState::Signaled(Signal::SIGKILL as i32));
        assert_eq!(try_wait(&mut handle).unwrap(), Some(state));
    }

    #[test]
    fn test_interleaved_runs_passes_while_alive() {
        let mut handle = launch(&ProcessSpec::new("/bin/sleep").arg("0.3")).unwrap();
        let mut passes = 0;
        let mut run_loop = |_: &RunLoopMode, limit: Duration| {
            passes += 1;
            std::thread::sleep(limit);
            PassOutcome::TimedOut
        };

        let state = wait_interleaved(
            &mut handle,
            &mut run_loop,
            &RunLoopMode::DEFAULT,
            Duration::from_millis(10),
        )
        .unwrap();

        assert_eq!(state, ProcessState::Exited(0));
        assert!(passes >= 1);
    }

    #[test]
    fn test_interleaved_stops_after_termination() {
        let mut handle = launch(&ProcessSpec::new("/bin/sleep").arg("5")).unwrap();
        let pid = handle.pid().unwrap();
        let mut passes = 0;

        // The first pass kills the child and gives it time to die, so the
        // next probe must see it and no second pass may run.
        let mut run_loop = |_: &RunLoopMode, _: Duration| {
            passes += 1;
            if passes == 1 {
                kill(pid, Signal::SIGKILL).unwrap();
                std::thread::sleep(Duration::from_millis(200));
            }
            PassOutcome::TimedOut
        };

        let state = wait_interleaved(
            &mut handle,
            &mut run_loop,
            &RunLoopMode::DEFAULT,
            Duration::from_millis(10),
        )
        .unwrap();

        assert_eq!(state, ProcessState::Signaled(Signal::SIGKILL as i32));
        assert_eq!(passes, 1);
    }

    #[test]
    fn test_interleaved_skips_passes_for_finished_child() {
        let mut handle = launch(&ProcessSpec::new("/bin/true")).unwrap();
        wait(&mut handle).unwrap();

        let mut passes = 0;
        let mut run_loop = |_: &RunLoopMode, _: Duration| {
            passes += 1;
            PassOutcome::TimedOut
        };

        let state = wait_interleaved(
            &mut handle,
            &mut run_loop,
            &RunLoopMode::DEFAULT,
            DEFAULT_POLL_INTERVAL,
        )
        .unwrap();

        assert_eq!(state, ProcessState::Exited(0));
        assert_eq!(passes, 0);
    }

    #[test]
    fn test_interleaved_passes_mode_through() {
        let mut handle = launch(&sh("sleep 0.1")).unwrap();
        let mode = RunLoopMode::new("modal-panel");
        let mut seen = Vec::new();
        let mut run_loop = |mode: &RunLoopMode, limit: Duration| {
            seen.push(mode.clone());
            std::thread::sleep(limit);
            PassOutcome::TimedOut
        };

        wait_interleaved(&mut handle, &mut run_loop, &mode, Duration::from_millis(10)).unwrap();

        assert!(!seen.is_empty());
        assert!(seen.iter().all(|m| *m == mode));
    }

    #[test]
    fn test_interleaved_finished_pass_does_not_spin() {
        let mut handle = launch(&ProcessSpec::new("/bin/sleep").arg("0.2")).unwrap();
        let mut passes = 0;
        let mut run_loop = |_: &RunLoopMode, _: Duration| {
            passes += 1;
            PassOutcome::Finished
        };

        wait_interleaved(
            &mut handle,
            &mut run_loop,
            &RunLoopMode::DEFAULT,
            Duration::from_millis(20),
        )
        .unwrap();

        // ~10 slices of 20ms; a spinning loop would run thousands of passes
        assert!(passes < 50, "ran {passes} passes");
    }
}
