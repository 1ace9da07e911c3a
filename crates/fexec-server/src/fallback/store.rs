//! Fallback Address Store
//!
//! A plain text file with one address per line, shared between the fallback
//! listener (writer) and the invocation server (reader). Replacements are
//! written to a temporary file in the same directory and renamed into place,
//! so a reader sees either the old list or the new one, never a mix.

use fexec_common::protocol::error::{FexecError, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where the address list lives unless configured otherwise.
pub const DEFAULT_FALLBACK_FILE: &str = "/tmp/_executor_fallback_addresses.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackAddressStore {
    path: PathBuf,
}

impl FallbackAddressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current list in stored order.
    ///
    /// A missing file is an empty list. Blank lines and surrounding
    /// whitespace are ignored.
    pub fn load(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the whole list.
    ///
    /// Entries that are blank or span lines cannot be stored and are
    /// skipped. Returns the number of addresses written.
    pub fn replace(&self, addresses: &[String]) -> Result<usize> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut file = NamedTempFile::new_in(dir)?;
        let mut written = 0;
        for address in addresses {
            let address = address.trim();
            if address.is_empty() || address.contains(|c| c == '\n' || c == '\r') {
                tracing::warn!("Skipping unusable fallback address {:?}", address);
                continue;
            }
            writeln!(file, "{}", address)?;
            written += 1;
        }
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| FexecError::Io(e.error))?;

        Ok(written)
    }
}

impl Default for FallbackAddressStore {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_FILE)
    }
}
