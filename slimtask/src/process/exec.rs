//! Direct exec: replace the calling process image without forking.

use tracing::debug;

use super::error::ExecError;
use super::spec::{ExecImage, ProcessSpec};
use super::threads::live_thread_count;

/// Replace the current process with the program described by `spec`.
///
/// Nothing is forked and no thread or callback is set up on the way, so this
/// works after [`launch`](super::launch) and the waiters, which never create
/// threads either. The caller must be single-threaded: some platforms refuse
/// `execve` in a process with more than one live thread.
///
/// Never returns on success. On failure the process is left as it was and the
/// `execve` error is returned. A working directory in the spec is ignored;
/// the image runs in the caller's current directory.
pub fn execute(spec: &ProcessSpec) -> ExecError {
    let image = match ExecImage::prepare(spec) {
        Ok(image) => image,
        Err(err) => return err.into(),
    };

    debug!(path = %image.path().display(), "exec without fork");

    match image.exec() {
        Ok(never) => match never {},
        Err(source) => ExecError::Exec {
            path: image.path().to_path_buf(),
            source,
            threads: live_thread_count(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_missing_executable_reports_enoent() {
        let err = execute(&ProcessSpec::new("/nonexistent/slimtask-binary"));

        match err {
            ExecError::Exec { path, source, .. } => {
                assert_eq!(path.to_str(), Some("/nonexistent/slimtask-binary"));
                assert_eq!(source, Errno::ENOENT);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_executable_reports_eacces() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = execute(&ProcessSpec::new(file.path()));

        assert!(matches!(
            err,
            ExecError::Exec {
                source: Errno::EACCES,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_spec_is_rejected_before_exec() {
        let err = execute(&ProcessSpec::new("/bin/true").env("BAD", "nul\0value"));
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }
}
