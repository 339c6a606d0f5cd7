//! Atomic file output.

use crate::core::DEFAULT_FILE_MODE;
use crate::error::{ReloadError, Result};
use std::io::Write;
use std::path::Path;
use tracing::trace;

/// Writes files so readers only ever see the previous or the new complete content.
///
/// Data goes to a temporary file created next to the destination, which then gets the
/// configured permissions and is renamed over the destination. The temporary file is
/// removed on every failure path.
#[derive(Debug, Clone, Copy)]
pub struct AtomicWriter {
    mode: u32,
}

impl Default for AtomicWriter {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_MODE)
    }
}

impl AtomicWriter {
    /// Create a writer producing files with the given permission bits.
    pub fn new(mode: u32) -> Self {
        Self { mode }
    }

    /// Permission bits applied to written files.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Replace `path` with `data`.
    ///
    /// Blocking; call it from `spawn_blocking` inside async code.
    ///
    /// # Errors
    ///
    /// Returns [`ReloadError::WriteFailure`] if creating, writing, chmod-ing or renaming
    /// the temporary file fails. The destination is left untouched in that case.
    pub fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let failure = |source: std::io::Error| ReloadError::WriteFailure {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        // Dropping `tmp` on an early return deletes the temporary file.
        let mut tmp = tempfile::Builder::new()
            .prefix(".reconfy")
            .tempfile_in(dir)
            .map_err(failure)?;
        trace!(temp = %tmp.path().display(), "writing temporary output");

        tmp.write_all(data).map_err(failure)?;
        tmp.as_file().sync_all().map_err(failure)?;
        self.set_permissions(tmp.as_file()).map_err(failure)?;

        tmp.persist(path).map_err(|e| failure(e.error))?;
        Ok(())
    }

    #[cfg(unix)]
    fn set_permissions(&self, file: &std::fs::File) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(self.mode))
    }

    #[cfg(not(unix))]
    fn set_permissions(&self, _file: &std::fs::File) -> std::io::Result<()> {
        Ok(())
    }
}
