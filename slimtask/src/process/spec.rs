//! Process specifications and their exec-ready form.
//!
//! A [`ProcessSpec`] is built by the caller with the usual builder methods.
//! Before any fork or exec happens it is converted into an [`ExecImage`]: every
//! string the child needs is turned into a `CString` in the calling process, so
//! the child only has to call `execve`.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::ffi::{CStr, CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use thiserror::Error;

/// A value of the spec that cannot be handed to the OS.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    /// The executable path is empty.
    #[error("executable path is empty")]
    EmptyPath,

    /// A string contains a NUL byte and cannot become a C string.
    #[error("{field} contains an interior NUL byte")]
    InteriorNul {
        /// Which part of the spec was rejected.
        field: &'static str,
    },
}

/// What to run: executable path, arguments and environment.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    /// Path of the executable. No `PATH` lookup is performed.
    pub program: PathBuf,

    /// Arguments passed after `argv[0]`.
    pub args: Vec<String>,

    /// Environment variables to set (merged with the inherited env).
    pub env: HashMap<String, String>,

    /// Environment variables to remove.
    pub env_remove: Vec<String>,

    /// Start from an empty environment instead of the caller's.
    pub env_clear: bool,

    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,

    /// Redirect the child's stdout into a pipe readable from the handle.
    pub capture_stdout: bool,
}

impl ProcessSpec {
    /// Create a spec for the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Add an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Remove an environment variable.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Clear the environment before setting variables.
    pub fn env_clear(mut self) -> Self {
        self.env_clear = true;
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Capture stdout through a pipe.
    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }
}

/// A [`ProcessSpec`] converted to the C strings `execve` consumes.
#[derive(Debug)]
pub struct ExecImage {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    working_dir: Option<CString>,
}

impl ExecImage {
    /// Convert a spec, resolving the environment against the current one.
    pub fn prepare(spec: &ProcessSpec) -> Result<Self, SpecError> {
        if spec.program.as_os_str().is_empty() {
            return Err(SpecError::EmptyPath);
        }

        let path = c_string(spec.program.as_os_str().as_bytes(), "executable path")?;

        // argv[0] is the executable path, as a shell would pass it
        let mut argv = Vec::with_capacity(spec.args.len() + 1);
        argv.push(path.clone());
        for arg in &spec.args {
            argv.push(c_string(arg.as_bytes(), "argument")?);
        }

        let envp = compose_env(spec)?;

        let working_dir = spec
            .working_dir
            .as_deref()
            .map(|dir| c_string(dir.as_os_str().as_bytes(), "working directory"))
            .transpose()?;

        Ok(Self {
            path,
            argv,
            envp,
            working_dir,
        })
    }

    /// The executable path.
    pub fn path(&self) -> &Path {
        Path::new(OsStr::from_bytes(self.path.as_bytes()))
    }

    /// The argument vector, `argv[0]` included.
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// The environment as `KEY=VALUE` entries.
    pub fn envp(&self) -> &[CString] {
        &self.envp
    }

    pub(crate) fn working_dir(&self) -> Option<&CStr> {
        self.working_dir.as_deref()
    }

    /// Replace the current process image. Only returns on failure.
    pub(crate) fn exec(&self) -> Result<Infallible, Errno> {
        nix::unistd::execve(&self.path, &self.argv, &self.envp)
    }
}

fn c_string(bytes: &[u8], field: &'static str) -> Result<CString, SpecError> {
    CString::new(bytes).map_err(|_| SpecError::InteriorNul { field })
}

/// Build the child's environment: inherited (unless cleared), minus removals,
/// plus overrides. Sorted so the result is deterministic.
fn compose_env(spec: &ProcessSpec) -> Result<Vec<CString>, SpecError> {
    let mut vars: BTreeMap<OsString, OsString> = if spec.env_clear {
        BTreeMap::new()
    } else {
        std::env::vars_os().collect()
    };

    for key in &spec.env_remove {
        vars.remove(OsStr::new(key));
    }

    for (key, value) in &spec.env {
        vars.insert(OsString::from(key), OsString::from(value));
    }

    vars.into_iter()
        .map(|(key, value)| {
            let mut entry = key.into_vec();
            entry.push(b'=');
            entry.extend(value.into_vec());
            c_string(&entry, "environment entry")
        })
        .collect()
}
