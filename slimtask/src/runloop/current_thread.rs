//! Run loop backed by a current-thread tokio runtime.
//!
//! Each mode owns a `LocalSet`; a pass drives only the set of the requested
//! mode, on the calling thread. The runtime is built without worker threads,
//! so waiting through it keeps the process eligible for a later exec.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::task::LocalSet;

use super::{PassOutcome, RunLoop, RunLoopMode};

/// A [`RunLoop`] that runs local tokio tasks grouped by mode.
pub struct TokioRunLoop {
    runtime: Runtime,
    modes: HashMap<RunLoopMode, LocalSet>,
}

impl TokioRunLoop {
    /// Build the runtime. Timers and I/O are enabled; no threads are started.
    pub fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            modes: HashMap::new(),
        })
    }

    /// Register a task that runs whenever `mode` is driven.
    pub fn spawn_in<F>(&mut self, mode: RunLoopMode, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        // Detached: the task lives as long as the mode's set.
        drop(self.modes.entry(mode).or_default().spawn_local(future));
    }

    /// Whether any task was ever registered for `mode`.
    pub fn has_mode(&self, mode: &RunLoopMode) -> bool {
        self.modes.contains_key(mode)
    }
}

impl RunLoop for TokioRunLoop {
    fn run_pass(&mut self, mode: &RunLoopMode, limit: Duration) -> PassOutcome {
        let Some(local) = self.modes.get(mode) else {
            return PassOutcome::Finished;
        };

        // The timer is created inside the runtime, not before entering it.
        local.block_on(&self.runtime, async move {
            tokio::time::sleep(limit).await;
        });
        PassOutcome::TimedOut
    }
}

impl std::fmt::Debug for TokioRunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut modes: Vec<_> = self.modes.keys().map(RunLoopMode::as_str).collect();
        modes.sort_unstable();
        f.debug_struct("TokioRunLoop").field("modes", &modes).finish()
    }
}
