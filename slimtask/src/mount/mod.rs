//! Automounter helper: attach a configured disk image and print its map entry.
//!
//! The workflow runs each external tool as a single child through
//! [`crate::process::Task`], so the process stays single-threaded and could
//! still replace itself with `exec` at any point.

mod attach;
mod config;
mod mounter;
mod privileges;

pub use attach::{AttachError, AttachInfo};
pub use config::{CommandTemplate, MountConfig, ToolsConfig};
pub use mounter::{MountError, Mounter};
pub use privileges::{drop_to_owner, image_owner, PrivilegeError};

/// Command line usage error, including an unknown map key.
pub const EX_USAGE: u8 = 64;

/// The image could not be attached.
pub const EX_UNAVAILABLE: u8 = 69;

/// Launching, waiting, reading or decoding failed.
pub const EX_OSERR: u8 = 71;
