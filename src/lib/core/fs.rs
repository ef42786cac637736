use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::error::{ReadPropError, Result};
use super::io::OutputStream;

/// Create parent directories for a path when missing.
pub fn make_parent_dirs<P: AsRef<Path>>(path: P) -> io::Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Detect whether a path uses a gzip-compatible extension.
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> bool {
    matches!(
        path.as_ref().extension().unwrap_or_else(|| OsStr::new("")),
        ext if ext == "gz" || ext == "gzip" || ext == "bgzf"
    )
}

/// An output file that only appears at its destination once [`commit`] succeeds.
///
/// Content is written to a hidden temporary file in the closest existing
/// ancestor of the destination, so the final rename stays on one filesystem.
/// Missing parent directories are only created by `commit`. Dropping a
/// `StagedOutput` without committing removes the temporary file, so a failed
/// run leaves neither a partial report nor new directories behind.
///
/// [`commit`]: StagedOutput::commit
#[derive(Debug)]
pub struct StagedOutput {
    target: PathBuf,
    temp: NamedTempFile,
}

impl StagedOutput {
    pub fn create<P: AsRef<Path>>(target: P) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        if target.is_dir() {
            return Err(ReadPropError::output(
                &target,
                io::Error::new(io::ErrorKind::InvalidInput, "output path is a directory"),
            ));
        }
        let dir = staging_dir(&target);
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("readprop");
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".partial")
            .tempfile_in(&dir)
            .map_err(|e| ReadPropError::output(&target, e))?;

        Ok(Self { target, temp })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn staging_path(&self) -> &Path {
        self.temp.path()
    }

    /// Open a writer over the staged file, gzip-compressing when the target
    /// carries a gzip extension.
    pub fn stream(&self) -> Result<OutputStream> {
        let file = self
            .temp
            .reopen()
            .map_err(|e| ReadPropError::output(&self.target, e))?;
        Ok(OutputStream::new(file, is_gzipped(&self.target)))
    }

    /// Atomically move the staged file to its destination.
    pub fn commit(self) -> Result<PathBuf> {
        let StagedOutput { target, temp } = self;
        make_parent_dirs(&target).map_err(|e| ReadPropError::output(&target, e))?;
        temp.persist(&target)
            .map_err(|e| ReadPropError::output(&target, e.error))?;
        Ok(target)
    }
}

// Nearest ancestor of the target's parent that already exists.
fn staging_dir(target: &Path) -> PathBuf {
    let mut dir = target.parent();
    while let Some(candidate) = dir {
        if candidate.as_os_str().is_empty() {
            break;
        }
        if candidate.is_dir() {
            return candidate.to_path_buf();
        }
        dir = candidate.parent();
    }
    PathBuf::from(".")
}
