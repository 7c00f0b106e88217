//! Thread-free process execution.
//!
//! Fork+exec, direct exec and two ways of waiting, none of which start a
//! thread or register for asynchronous notification. A process that only uses
//! these stays single-threaded and can still replace its own image later.
//!
//! The caller is expected to be single-threaded whenever it forks or execs;
//! nothing here can check that for it.

mod error;
mod exec;
mod handle;
mod launch;
mod spec;
mod task;
mod threads;
mod wait;

pub use error::{ExecError, LaunchError, WaitError};
pub use exec::execute;
pub use handle::{ChildProcessHandle, ProcessState};
pub use launch::{launch, EXEC_FAILURE_STATUS};
pub use spec::{ExecImage, ProcessSpec, SpecError};
pub use task::Task;
pub use threads::live_thread_count;
pub use wait::{try_wait, wait, wait_interleaved, DEFAULT_POLL_INTERVAL};
