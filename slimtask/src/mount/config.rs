//! Configuration file for `imgmount`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::process::ProcessSpec;

const CONFIG_DIR: &str = "imgmount";
const CONFIG_FILE: &str = "config.json";

/// Placeholder replaced with the volume kind in tool templates.
const KIND_PLACEHOLDER: &str = "{type}";

/// Image map and tool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Map key -> disk image path.
    pub images: BTreeMap<String, PathBuf>,

    /// Probability of compacting the image before attaching it.
    pub compact_ratio: f64,

    /// Switch to the image owner's uid/gid before running any tool.
    pub drop_privileges: bool,

    /// Volume kinds that may be mounted.
    pub volume_kinds: Vec<String>,

    /// Options emitted in the map entry after `-fstype=`.
    pub mount_options: Vec<String>,

    /// External tool command lines.
    pub tools: ToolsConfig,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            images: BTreeMap::new(),
            compact_ratio: 0.1,
            drop_privileges: true,
            volume_kinds: vec!["apfs".to_string(), "hfs".to_string()],
            mount_options: vec![
                "nobrowse".to_string(),
                "nodev".to_string(),
                "nosuid".to_string(),
            ],
            tools: ToolsConfig::default(),
        }
    }
}

impl MountConfig {
    /// Default location: `<config dir>/imgmount/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from an explicit path, or from the default path if it exists.
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Configured images whose files exist, sorted by key.
    pub fn available_images(&self) -> BTreeMap<&str, &Path> {
        self.images
            .iter()
            .filter(|(_, path)| path.exists())
            .map(|(key, path)| (key.as_str(), path.as_path()))
            .collect()
    }
}

/// Command lines of the external tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Disk image tool (`compact`, `attach`).
    pub hdiutil: CommandTemplate,
    /// Filesystem checker; `{type}` is replaced with the volume kind.
    pub fsck: CommandTemplate,
    /// Disk repair tool (`repairDisk`).
    pub diskutil: CommandTemplate,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            hdiutil: CommandTemplate::new(["/usr/bin/hdiutil"]),
            fsck: CommandTemplate::new(["/sbin/fsck_{type}"]),
            diskutil: CommandTemplate::new(["/usr/sbin/diskutil"]),
        }
    }
}

/// Program plus leading arguments, as a JSON array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    /// Create a template from its parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Build a spec with `{type}` substituted and `args` appended.
    ///
    /// Returns `None` for an empty template.
    pub fn spec<S: AsRef<str>>(&self, kind: Option<&str>, args: &[S]) -> Option<ProcessSpec> {
        let substitute = |part: &str| match kind {
            Some(kind) => part.replace(KIND_PLACEHOLDER, kind),
            None => part.to_string(),
        };

        let (program, leading) = self.0.split_first()?;
        let spec = ProcessSpec::new(substitute(program))
            .args(leading.iter().map(|part| substitute(part)))
            .args(args.iter().map(|arg| arg.as_ref().to_string()));
        Some(spec)
    }
}
