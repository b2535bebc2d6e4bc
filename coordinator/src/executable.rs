//! Model executable staging: verify the configured binary exists and is
//! executable, optionally copying it into a temporary directory so the run
//! is isolated from in-place rebuilds of the source binary.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use shared::error::ExecutableError;

/// A verified, possibly-relocated model executable. Holds the `TempDir`
/// guard alive for as long as the staged copy is in use; dropping it
/// removes the temporary copy.
pub struct StagedExecutable {
    pub path: PathBuf,
    _tmpdir: Option<tempfile::TempDir>,
}

/// Verifies `binpath` exists and is executable, then optionally copies it
/// into a fresh temp directory (for model binaries that must be relocatable,
/// i.e. position-independent, to run from there).
pub fn stage_executable(
    binpath: &Path,
    model_name: &str,
    run_from_tmpdir: bool,
) -> Result<StagedExecutable, ExecutableError> {
    if !binpath.is_file() {
        return Err(ExecutableError::NotFound(binpath.to_path_buf()));
    }

    let metadata = std::fs::metadata(binpath).map_err(ExecutableError::Stage)?;
    if metadata.permissions().mode() & 0o111 == 0 {
        return Err(ExecutableError::NotExecutable(binpath.to_path_buf()));
    }

    if !run_from_tmpdir {
        return Ok(StagedExecutable {
            path: binpath.to_path_buf(),
            _tmpdir: None,
        });
    }

    let tmpdir = tempfile::Builder::new()
        .prefix(model_name)
        .tempdir()
        .map_err(ExecutableError::Stage)?;
    let file_name = binpath
        .file_name()
        .expect("verified binpath is a file, so it has a file name");
    let tmp_binpath = tmpdir.path().join(file_name);
    std::fs::copy(binpath, &tmp_binpath).map_err(ExecutableError::Stage)?;

    Ok(StagedExecutable {
        path: tmp_binpath,
        _tmpdir: Some(tmpdir),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    fn write_executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o755)
            .open(&path)
            .unwrap();
        f.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        path
    }

    #[test]
    fn missing_binary_is_not_found() {
        let err = stage_executable(Path::new("/nonexistent/bin"), "demo", false).unwrap_err();
        assert!(matches!(err, ExecutableError::NotFound(_)));
    }

    #[test]
    fn non_executable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model");
        std::fs::write(&path, b"not executable").unwrap();

        let err = stage_executable(&path, "demo", false).unwrap_err();
        assert!(matches!(err, ExecutableError::NotExecutable(_)));
    }

    #[test]
    fn in_place_stage_keeps_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_executable(dir.path(), "model");

        let staged = stage_executable(&path, "demo", false).unwrap();
        assert_eq!(staged.path, path);
    }

    #[test]
    fn tmpdir_stage_copies_to_new_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_executable(dir.path(), "model");

        let staged = stage_executable(&path, "demo", true).unwrap();
        assert_ne!(staged.path, path);
        assert!(staged.path.is_file());
        assert_eq!(staged.path.file_name(), path.file_name());
    }
}
