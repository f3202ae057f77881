//! Target file writer
//!
//! The file is always replaced as a whole. With `atomic` set (the default) the
//! bytes go to a temporary file in the destination directory which is then
//! renamed over the destination, so file_sd never reads a half-written file.

use crate::error::WriteError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Persister {
    path: PathBuf,
    atomic: bool,
}

impl Persister {
    pub fn new(path: impl Into<PathBuf>, atomic: bool) -> Self {
        Self {
            path: path.into(),
            atomic,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the destination file with `bytes`.
    ///
    /// Runs on the blocking pool.
    pub async fn persist(&self, bytes: Vec<u8>) -> Result<(), WriteError> {
        let path = self.path.clone();
        let atomic = self.atomic;
        tokio::task::spawn_blocking(move || {
            if atomic {
                write_atomic(&path, &bytes)
            } else {
                write_in_place(&path, &bytes)
            }
        })
        .await?
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> WriteError + '_ {
    move |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_in_place(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    std::fs::write(path, bytes).map_err(io_error(path))?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error(path))?;
    tmp.write_all(bytes).map_err(io_error(path))?;
    tmp.as_file().sync_all().map_err(io_error(path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(io_error(path))?;
    }

    tmp.persist(path).map_err(|e| WriteError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    debug!("Replaced {:?} with {} bytes", path, bytes.len());
    Ok(())
}
