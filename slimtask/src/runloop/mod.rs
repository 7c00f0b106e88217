//! The event-loop seam used by the interleaved wait.
//!
//! A run loop is anything that can be asked to service its event sources for
//! a bounded time, restricted to a mode. The mode is an opaque name; only the
//! run loop knows what it selects.

mod current_thread;

use std::borrow::Cow;
use std::time::Duration;

pub use current_thread::TokioRunLoop;

/// Name of a run loop mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunLoopMode(Cow<'static, str>);

impl RunLoopMode {
    /// The mode used when callers have no preference.
    pub const DEFAULT: Self = Self(Cow::Borrowed("default"));

    /// Create a mode from any name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The mode name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunLoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a run loop pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The mode had nothing to service; the pass returned immediately.
    Finished,
    /// The time limit was reached.
    TimedOut,
    /// An event source was handled before the limit.
    HandledSource,
    /// The run loop was asked to stop.
    Stopped,
}

/// An event loop that can run one bounded pass in a given mode.
pub trait RunLoop {
    /// Service event sources registered for `mode` for at most `limit`.
    fn run_pass(&mut self, mode: &RunLoopMode, limit: Duration) -> PassOutcome;
}

impl<F> RunLoop for F
where
    F: FnMut(&RunLoopMode, Duration) -> PassOutcome,
{
    fn run_pass(&mut self, mode: &RunLoopMode, limit: Duration) -> PassOutcome {
        self(mode, limit)
    }
}
