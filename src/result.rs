/// Result file: the one-shot exit-status artifact an orchestrator polls for.
///
/// Content is a decimal integer, either the child's exit code (0-255) or
/// [`LAUNCH_FAILED`]. Its existence alone means "job finished".
/// Uses atomic write pattern: fill a temp file in the same directory, then
/// link it into place without clobbering an existing result.
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Sentinel recorded when the child never produced a real exit code.
pub const LAUNCH_FAILED: i32 = -2;

/// Writes the exit status for one supervised run.
#[derive(Debug, Clone)]
pub struct ResultFile {
    path: PathBuf,
}

impl ResultFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `code`. Fails if a result already exists.
    pub fn record(&self, code: i32) -> Result<(), RecordError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".jobwarden-result.")
            .permissions(std::fs::Permissions::from_mode(0o644))
            .tempfile_in(dir)
            .map_err(|e| RecordError::Create {
                dir: dir.to_path_buf(),
                source: e,
            })?;

        write!(tmp, "{code}")
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| RecordError::Write {
                path: tmp.path().to_path_buf(),
                source: e,
            })?;

        tmp.persist_noclobber(&self.path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                RecordError::AlreadyRecorded {
                    path: self.path.clone(),
                }
            } else {
                RecordError::Persist {
                    path: self.path.clone(),
                    source: e.error,
                }
            }
        })?;

        Ok(())
    }
}

/// Errors from result file operations.
#[derive(Debug)]
pub enum RecordError {
    Create {
        dir: PathBuf,
        source: std::io::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    AlreadyRecorded {
        path: PathBuf,
    },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Create { dir, source } => {
                write!(
                    f,
                    "failed to create temp result file in {}: {}",
                    dir.display(),
                    source
                )
            }
            RecordError::Write { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            RecordError::Persist { path, source } => {
                write!(f, "failed to move result into {}: {}", path.display(), source)
            }
            RecordError::AlreadyRecorded { path } => {
                write!(f, "result already recorded at {}", path.display())
            }
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordError::Create { source, .. } => Some(source),
            RecordError::Write { source, .. } => Some(source),
            RecordError::Persist { source, .. } => Some(source),
            RecordError::AlreadyRecorded { .. } => None,
        }
    }
}
