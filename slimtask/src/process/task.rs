//! Single-child owner composing launch, the waiters and exec.

use std::fs::File;
use std::time::Duration;

use nix::unistd::Pid;

use super::error::{ExecError, LaunchError, WaitError};
use super::exec::execute;
use super::handle::{ChildProcessHandle, ProcessState};
use super::launch::launch;
use super::spec::ProcessSpec;
use super::wait::{wait, wait_interleaved, DEFAULT_POLL_INTERVAL};
use crate::runloop::{RunLoop, RunLoopMode};

/// A process spec plus at most one child launched from it.
///
/// `Task` never runs more than one child at a time: launching while the
/// previous child is still unreaped fails with [`LaunchError::Busy`]. Once the
/// child has been waited for, the task can launch again or exec.
///
/// # Example
///
/// ```rust,no_run
/// use slimtask::process::{ProcessSpec, ProcessState, Task};
///
/// fn main() -> anyhow::Result<()> {
///     let mut task = Task::new(ProcessSpec::new("/bin/sh").args(["-c", "exit 7"]));
///     task.launch()?;
///     assert_eq!(task.wait_until_exit()?, ProcessState::Exited(7));
///
///     // Still single-threaded, so replacing the image works.
///     let err = Task::new(ProcessSpec::new("/usr/bin/env")).execute();
///     Err(err.into())
/// }
/// ```
#[derive(Debug)]
pub struct Task {
    spec: ProcessSpec,
    child: ChildProcessHandle,
    poll_interval: Duration,
}

impl Task {
    /// Create a task for the given spec. Nothing is launched yet.
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            child: ChildProcessHandle::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the run loop slice used by [`Self::wait_until_exit_in_mode`].
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The spec this task runs.
    pub const fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Fork and exec the spec.
    ///
    /// Fails with [`LaunchError::Busy`] while the previous child is unreaped;
    /// that child's handle is left as it was.
    pub fn launch(&mut self) -> Result<(), LaunchError> {
        if let (true, Some(pid)) = (self.child.is_running(), self.child.pid()) {
            return Err(LaunchError::Busy { pid });
        }

        self.child = launch(&self.spec)?;
        Ok(())
    }

    /// Block until the child exits.
    pub fn wait_until_exit(&mut self) -> Result<ProcessState, WaitError> {
        wait(&mut self.child)
    }

    /// Wait for the child while running passes of `run_loop` in `mode`.
    pub fn wait_until_exit_in_mode<R>(
        &mut self,
        run_loop: &mut R,
        mode: &RunLoopMode,
    ) -> Result<ProcessState, WaitError>
    where
        R: RunLoop + ?Sized,
    {
        wait_interleaved(&mut self.child, run_loop, mode, self.poll_interval)
    }

    /// Exit code or terminating signal, once the child has been waited for.
    pub const fn termination_status(&self) -> Option<i32> {
        self.child.state().termination_status()
    }

    /// State of the current (or last) child.
    pub const fn state(&self) -> ProcessState {
        self.child.state()
    }

    /// Pid of the current (or last) child.
    pub const fn pid(&self) -> Option<Pid> {
        self.child.pid()
    }

    /// Whether a child is running and unreaped.
    pub const fn is_running(&self) -> bool {
        self.child.is_running()
    }

    /// Captured stdout of the current child.
    pub fn take_stdout(&mut self) -> Option<File> {
        self.child.take_stdout()
    }

    /// The handle of the current (or last) child.
    pub const fn handle(&self) -> &ChildProcessHandle {
        &self.child
    }

    /// Replace the current process with this task's program.
    ///
    /// Only returns on failure. See [`execute`].
    pub fn execute(self) -> ExecError {
        execute(&self.spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runloop::PassOutcome;
    use nix::sys::signal::{kill, Signal};

    #[test]
    fn test_launch_and_wait() {
        let mut task = Task::new(ProcessSpec::new("/bin/sh").args(["-c", "exit 7"]));
        assert_eq!(task.state(), ProcessState::NotStarted);
        assert_eq!(task.termination_status(), None);

        task.launch().unwrap();
        assert!(task.pid().is_some());
        assert!(task.is_running());

        assert_eq!(task.wait_until_exit().unwrap(), ProcessState::Exited(7));
        assert_eq!(task.termination_status(), Some(7));
    }

    #[test]
    fn test_second_launch_while_running_is_rejected() {
        let mut task = Task::new(ProcessSpec::new("/bin/sleep").arg("5"));
        task.launch().unwrap();
        let pid = task.pid().unwrap();

        match task.launch() {
            Err(LaunchError::Busy { pid: busy }) => assert_eq!(busy, pid),
            other => panic!("unexpected result: {other:?}"),
        }

        // The running child is untouched and can still be reaped.
        assert_eq!(task.pid(), Some(pid));
        assert!(task.is_running());
        kill(pid, Signal::SIGKILL).unwrap();
        assert_eq!(
            task.wait_until_exit().unwrap(),
            ProcessState::Signaled(Signal::SIGKILL as i32)
        );
    }

    #[test]
    fn test_relaunch_after_exit() {
        let mut task = Task::new(ProcessSpec::new("/bin/true"));

        task.launch().unwrap();
        let first = task.pid().unwrap();
        task.wait_until_exit().unwrap();
        task.launch().unwrap();
        let second = task.pid().unwrap();
        task.wait_until_exit().unwrap();

        assert_ne!(first, second);
        assert_eq!(task.state(), ProcessState::Exited(0));
    }

    #[test]
    fn test_wait_without_launch() {
        let mut task = Task::new(ProcessSpec::new("/bin/true"));
        assert!(matches!(task.wait_until_exit(), Err(WaitError::NotStarted)));
    }

    #[test]
    fn test_wait_in_mode_observes_external_kill() {
        let mut task = Task::new(ProcessSpec::new("/bin/sleep").arg("5"))
            .poll_interval(Duration::from_millis(10));
        task.launch().unwrap();
        let pid = task.pid().unwrap();
        let mode = RunLoopMode::new("events");

        let mut passes = 0;
        let mut run_loop = |_: &RunLoopMode, limit: Duration| {
            passes += 1;
            if passes == 3 {
                kill(pid, Signal::SIGTERM).unwrap();
            }
            std::thread::sleep(limit);
            PassOutcome::TimedOut
        };

        let state = task.wait_until_exit_in_mode(&mut run_loop, &mode).unwrap();

        assert_eq!(state, ProcessState::Signaled(Signal::SIGTERM as i32));
        // Seen within a few polling intervals of the kill
        assert!(passes >= 3 && passes < 50, "ran {passes} passes");
    }

    #[test]
    fn test_execute_failure_returns() {
        let err = Task::new(ProcessSpec::new("/nonexistent/slimtask-binary")).execute();
        assert!(matches!(err, ExecError::Exec { .. }));
    }
}
