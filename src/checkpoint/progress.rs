//! Progress marker
//!
//! Persists the sequence of the last segment a loop has fully processed.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LcrError, Result};

/// A single 8-byte big-endian sequence number stored in its own file
#[derive(Debug, Clone)]
pub struct ProgressMarker {
    path: PathBuf,
}

impl ProgressMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last processed sequence; 0 when nothing has been processed yet
    pub fn load(&self) -> Result<u64> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut raw = [0u8; 8];
        file.read_exact(&mut raw).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => LcrError::Corruption(format!(
                "progress marker {} is shorter than 8 bytes",
                self.path.display()
            )),
            _ => LcrError::Io(e),
        })?;
        Ok(u64::from_be_bytes(raw))
    }

    /// Replace the stored sequence
    ///
    /// Goes through a temporary file and a rename so a crash leaves either the
    /// old or the new value.
    pub fn store(&self, sequence: u64) -> Result<()> {
        let tmp = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&sequence.to_be_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            // persist the rename itself; not supported on every platform
            if let Ok(handle) = File::open(dir) {
                let _ = handle.sync_all();
            }
        }

        debug!(path = %self.path.display(), sequence, "stored progress");
        Ok(())
    }

    /// Sibling of the marker with `.tmp` appended to its full file name
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
