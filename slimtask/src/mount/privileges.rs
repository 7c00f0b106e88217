//! Switching to the owner of a disk image.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::{setgid, setuid, Gid, Uid};
use thiserror::Error;
use tracing::debug;

/// Failure to assume the image owner's identity.
#[derive(Debug, Error)]
pub enum PrivilegeError {
    /// The image could not be inspected.
    #[error("failed to stat {}: {source}", .path.display())]
    Stat {
        /// Image path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `setgid` failed.
    #[error("setgid({gid}) failed: {source}")]
    SetGid {
        /// Requested group.
        gid: Gid,
        /// Underlying error.
        #[source]
        source: Errno,
    },

    /// `setuid` failed.
    #[error("setuid({uid}) failed: {source}")]
    SetUid {
        /// Requested user.
        uid: Uid,
        /// Underlying error.
        #[source]
        source: Errno,
    },
}

/// Owner and group of `path`.
pub fn image_owner(path: &Path) -> Result<(Uid, Gid), PrivilegeError> {
    let metadata = std::fs::metadata(path).map_err(|source| PrivilegeError::Stat {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((Uid::from_raw(metadata.uid()), Gid::from_raw(metadata.gid())))
}

/// Switch group, then user, to the owner of `path`.
///
/// The group is changed first, while the process may still be privileged.
/// Both switches are attempted; the first failure is returned.
pub fn drop_to_owner(path: &Path) -> Result<(), PrivilegeError> {
    let (uid, gid) = image_owner(path)?;

    let group = setgid(gid).map_err(|source| PrivilegeError::SetGid { gid, source });
    let user = setuid(uid).map_err(|source| PrivilegeError::SetUid { uid, source });
    group.and(user)?;

    debug!(%uid, %gid, "switched to image owner");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_of_own_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (uid, _) = image_owner(file.path()).unwrap();
        assert_eq!(uid, Uid::effective());
    }

    #[test]
    fn test_owner_of_missing_file() {
        let err = image_owner(Path::new("/nonexistent/image.dmg")).unwrap_err();
        assert!(matches!(err, PrivilegeError::Stat { .. }));
    }
}
