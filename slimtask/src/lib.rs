//! Single-threaded child process control.
//!
//! [`process`] launches one child with fork/exec, waits for it either by
//! blocking or by polling between passes of a caller-supplied [`runloop`],
//! and can replace the current process image. Nothing here spawns a helper
//! thread, so `exec` keeps working after any number of launches.
//!
//! [`mount`] is the `imgmount` automounter helper built on top of it.

pub mod mount;
pub mod process;
pub mod runloop;
