//! Decoding of `hdiutil attach -plist` output.

use serde::Deserialize;
use thiserror::Error;

/// The mountable volume of an attached image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachInfo {
    /// Device node, e.g. `/dev/disk4s1`.
    pub device: String,
    /// Volume kind, e.g. `apfs`.
    pub kind: String,
}

/// Attach output that does not describe a usable volume.
#[derive(Debug, Error)]
pub enum AttachError {
    /// Not a property list of the expected shape.
    #[error("malformed attach output: {0}")]
    Plist(#[from] plist::Error),

    /// No entity is both mountable and of an allowed kind.
    #[error("no mountable volume of kind {kinds} among {count} system entities")]
    NoMountableVolume {
        /// Number of entities inspected.
        count: usize,
        /// Allowed kinds, comma separated.
        kinds: String,
    },

    /// The matching entity has no device node.
    #[error("mountable {kind} volume has no dev-entry")]
    MissingDevice {
        /// Kind of the matching volume.
        kind: String,
    },
}

#[derive(Debug, Deserialize)]
struct AttachOutput {
    #[serde(rename = "system-entities")]
    system_entities: Vec<SystemEntity>,
}

#[derive(Debug, Deserialize)]
struct SystemEntity {
    #[serde(rename = "dev-entry")]
    dev_entry: Option<String>,
    #[serde(rename = "potentially-mountable", default)]
    potentially_mountable: bool,
    #[serde(rename = "volume-kind")]
    volume_kind: Option<String>,
}

impl AttachInfo {
    /// Pick the first mountable entity whose kind is in `allowed_kinds`.
    pub fn from_plist<S: AsRef<str>>(data: &[u8], allowed_kinds: &[S]) -> Result<Self, AttachError> {
        let output: AttachOutput = plist::from_bytes(data)?;
        let count = output.system_entities.len();

        for entity in output.system_entities {
            let Some(kind) = entity.volume_kind else {
                continue;
            };
            if !entity.potentially_mountable || !allowed_kinds.iter().any(|k| k.as_ref() == kind) {
                continue;
            }

            return match entity.dev_entry {
                Some(device) => Ok(Self { device, kind }),
                None => Err(AttachError::MissingDevice { kind }),
            };
        }

        Err(AttachError::NoMountableVolume {
            count,
            kinds: allowed_kinds
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(","),
        })
    }
}
