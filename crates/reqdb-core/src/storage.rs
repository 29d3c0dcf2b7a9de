//! Staged snapshot files.
//!
//! Every snapshot write goes to a uniquely named temp file next to its target
//! and is renamed over the live file only when the owning index publishes. A
//! failed or abandoned rebuild never touches what is on disk, and concurrent
//! stages never share a temp file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// A fully written temp file waiting to replace `target`. Dropping it
/// without committing removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Rename into place. On failure the temp file is removed.
    pub fn commit(self) -> Result<()> {
        self.tmp.persist(&self.target).map_err(|e| Error::io(&self.target, e.error))?;
        Ok(())
    }

    pub fn discard(self) {}
}

/// Write `bytes` to `.<name>.<random>.tmp` next to `target` and fsync it.
pub fn stage_bytes(target: &Path, bytes: &[u8]) -> Result<StagedFile> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::io(parent, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| Error::io(tmp.path(), e))?;
    Ok(StagedFile { tmp, target: target.to_path_buf() })
}

/// Read a snapshot file; `Ok(None)` when it was never written.
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}
