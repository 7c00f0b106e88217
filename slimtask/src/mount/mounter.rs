//! The attach workflow behind `imgmount <key>`.
//!
//! Every external tool runs through [`Task`]: fork, exec, blocking wait. No
//! helper threads are involved at any point.

use std::io::Read;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::{access, AccessFlags};
use rand::Rng;
use thiserror::Error;
use tracing::{error, info, warn};

use super::attach::{AttachError, AttachInfo};
use super::config::{CommandTemplate, MountConfig};
use super::privileges::drop_to_owner;
use super::{EX_OSERR, EX_UNAVAILABLE, EX_USAGE};
use crate::process::{LaunchError, ProcessState, Task, WaitError};

/// Failure of the attach workflow.
#[derive(Debug, Error)]
pub enum MountError {
    /// The key is not configured or its image does not exist.
    #[error("unknown image '{0}'")]
    UnknownImage(String),

    /// A tool template is empty.
    #[error("no command configured for {0}")]
    EmptyCommand(&'static str),

    /// A tool's program is missing or not executable.
    #[error("cannot run {tool} at {}: {source}", .path.display())]
    NotExecutable {
        /// Tool name.
        tool: &'static str,
        /// Resolved program path.
        path: PathBuf,
        /// Error reported by `access`.
        #[source]
        source: Errno,
    },

    /// A tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    Launch {
        /// Tool name.
        tool: &'static str,
        /// Underlying error.
        #[source]
        source: LaunchError,
    },

    /// A tool could not be waited for.
    #[error("failed to wait for {tool}: {source}")]
    Wait {
        /// Tool name.
        tool: &'static str,
        /// Underlying error.
        #[source]
        source: WaitError,
    },

    /// A tool's output could not be read.
    #[error("failed to read {tool} output: {source}")]
    Read {
        /// Tool name.
        tool: &'static str,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `hdiutil attach` failed or printed nothing.
    #[error("attaching disk image '{}' failed: {status}", .image.display())]
    AttachFailed {
        /// Image path.
        image: PathBuf,
        /// How the attach tool ended.
        status: ProcessState,
    },

    /// The attach output names no usable volume.
    #[error(transparent)]
    Decode(#[from] AttachError),
}

impl MountError {
    /// The sysexits code `imgmount` exits with.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::UnknownImage(_) => EX_USAGE,
            Self::AttachFailed { .. } => EX_UNAVAILABLE,
            _ => EX_OSERR,
        }
    }
}

/// Status and captured stdout of one tool run.
struct ToolOutput {
    state: ProcessState,
    stdout: Vec<u8>,
}

/// Runs the attach workflow for configured images.
#[derive(Debug)]
pub struct Mounter {
    config: MountConfig,
}

impl Mounter {
    /// Create a mounter for the given configuration.
    pub const fn new(config: MountConfig) -> Self {
        Self { config }
    }

    /// Keys of the images that exist, sorted.
    pub fn list(&self) -> Vec<String> {
        self.config
            .available_images()
            .into_keys()
            .map(str::to_string)
            .collect()
    }

    /// Attach and check the image for `key`, returning its map entry.
    pub fn mount(&self, key: &str) -> Result<String, MountError> {
        let image = self
            .config
            .available_images()
            .get(key)
            .map(|path| path.to_path_buf())
            .ok_or_else(|| MountError::UnknownImage(key.to_string()))?;

        if self.config.drop_privileges {
            if let Err(err) = drop_to_owner(&image) {
                warn!(image = %image.display(), "could not switch to image owner: {err}");
            }
        }

        if self.should_compact() {
            self.compact(&image)?;
        }

        let info = self.attach(&image)?;
        self.check_filesystem(&info)?;

        Ok(self.map_entry(&info))
    }

    fn should_compact(&self) -> bool {
        let ratio = self.config.compact_ratio;
        if ratio.is_nan() || ratio <= 0.0 {
            return false;
        }
        rand::rng().random_bool(ratio.min(1.0))
    }

    /// Compact the image. A failing compaction is logged, not fatal.
    fn compact(&self, image: &Path) -> Result<(), MountError> {
        let image_arg = image.to_string_lossy();
        let args = ["compact", &*image_arg];
        let output = run_tool("hdiutil", &self.config.tools.hdiutil, None, &args, false)?;

        if output.state.success() {
            info!(image = %image.display(), "compacted disk image");
        } else {
            warn!(image = %image.display(), status = %output.state, "compaction failed for disk image");
        }
        Ok(())
    }

    /// Attach without mounting and decode the resulting volume.
    fn attach(&self, image: &Path) -> Result<AttachInfo, MountError> {
        let image_arg = image.to_string_lossy();
        let args = ["attach", &*image_arg, "-plist", "-nomount", "-noverify", "-noautofsck"];
        let output = run_tool("hdiutil", &self.config.tools.hdiutil, None, &args, true)?;

        if output.stdout.is_empty() || !output.state.success() {
            error!(image = %image.display(), status = %output.state, "attaching the disk image failed");
            return Err(MountError::AttachFailed {
                image: image.to_path_buf(),
                status: output.state,
            });
        }

        Ok(AttachInfo::from_plist(&output.stdout, &self.config.volume_kinds)?)
    }

    /// Run fsck on the attached volume and try a repair if it complains.
    fn check_filesystem(&self, info: &AttachInfo) -> Result<(), MountError> {
        let tools = &self.config.tools;
        let output = run_tool("fsck", &tools.fsck, Some(info.kind.as_str()), &["-q", info.device.as_str()], false)?;
        if output.state.success() {
            return Ok(());
        }

        warn!(device = %info.device, status = %output.state, "the file system needs repair");

        let output = run_tool("diskutil", &tools.diskutil, None, &["repairDisk", info.device.as_str()], false)?;
        if !output.state.success() {
            warn!(device = %info.device, status = %output.state, "the file system could not be repaired");
        }
        Ok(())
    }

    /// The automounter map entry for the volume.
    fn map_entry(&self, info: &AttachInfo) -> String {
        let mut fstype = format!("-fstype={}", info.kind);
        for option in &self.config.mount_options {
            fstype.push(',');
            fstype.push_str(option);
        }
        format!("{fstype} :{}", info.device)
    }
}

/// Launch one tool, optionally collect its stdout, and wait for it.
///
/// The program is checked up front: a child that fails to exec only reports
/// status 127, which would read as an ordinary tool failure.
fn run_tool(
    tool: &'static str,
    template: &CommandTemplate,
    kind: Option<&str>,
    args: &[&str],
    capture_stdout: bool,
) -> Result<ToolOutput, MountError> {
    let mut spec = template.spec(kind, args).ok_or(MountError::EmptyCommand(tool))?;
    spec.capture_stdout = capture_stdout;

    access(&spec.program, AccessFlags::X_OK).map_err(|source| MountError::NotExecutable {
        tool,
        path: spec.program.clone(),
        source,
    })?;

    let mut task = Task::new(spec);
    task.launch().map_err(|source| MountError::Launch { tool, source })?;

    // Drain before waiting; a full pipe would stall the tool.
    let mut stdout = Vec::new();
    let read = task.take_stdout().map(|mut pipe| pipe.read_to_end(&mut stdout));

    let state = task
        .wait_until_exit()
        .map_err(|source| MountError::Wait { tool, source })?;

    if let Some(Err(source)) = read {
        return Err(MountError::Read { tool, source });
    }

    Ok(ToolOutput { state, stdout })
}
