//! JSON store for the returns table.
//!
//! Layout: a single pretty-printed JSON document (4-space indent, trailing
//! newline) whose top level is the table itself.
//!
//! - A missing file, or one holding only whitespace, loads as "no table".
//! - Writes are atomic: write `{file}.tmp`, fsync, rename into place.
//! - A file that fails to parse can be moved aside to `{file}.quarantined`.

use crate::domain::Month;
use crate::table::ReturnsTable;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed returns table in {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("refusing to store non-finite return {value} for {month} {year}")]
    NonFinite { year: i32, month: Month, value: f64 },

    #[error("failed to serialize returns table: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A table read from disk together with the digest of its raw bytes.
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub table: ReturnsTable,
    pub digest: String,
}

/// File-backed returns table.
#[derive(Debug, Clone)]
pub struct TableStore {
    path: PathBuf,
}

impl TableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// `{file}.tmp`, the staging file for atomic writes.
    pub fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    /// `{file}.quarantined`, where a malformed store is moved.
    pub fn quarantine_path(&self) -> PathBuf {
        self.sibling(".quarantined")
    }

    /// Load the table. `Ok(None)` means there is nothing stored yet.
    pub fn load(&self) -> Result<Option<ReturnsTable>, StoreError> {
        Ok(self.load_stored()?.map(|s| s.table))
    }

    /// Load the table along with a digest of the bytes on disk.
    pub fn load_stored(&self) -> Result<Option<StoredTable>, StoreError> {
        // Raw bytes: invalid UTF-8 is a malformed table, not an I/O fault.
        let content = match fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!(path = %self.path.display(), "store file is empty");
            return Ok(None);
        }

        let table = serde_json::from_slice(&content).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        Ok(Some(StoredTable {
            table,
            digest: digest(&content),
        }))
    }

    /// Write the table atomically, creating parent directories as needed.
    ///
    /// Returns the digest of the bytes written. On failure the previous file,
    /// if any, is left as it was.
    pub fn write(&self, table: &ReturnsTable) -> Result<String, StoreError> {
        let rendered = render(table)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp_path = self.temp_path();
        if let Err(e) = write_synced(&tmp_path, rendered.as_bytes()) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::io(&tmp_path, e));
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::io(&self.path, e)
        })?;
        sync_parent_dir(&self.path);

        Ok(digest(rendered.as_bytes()))
    }

    /// Move the current file to the quarantine path, replacing any earlier one.
    pub fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let target = self.quarantine_path();
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&target, e)),
        }
        fs::rename(&self.path, &target).map_err(|e| StoreError::io(&self.path, e))?;
        tracing::warn!(
            from = %self.path.display(),
            to = %target.display(),
            "quarantined malformed returns table"
        );
        Ok(target)
    }
}

/// The exact text `TableStore::write` puts on disk.
///
/// Non-finite values are rejected: serde_json would write them as `null`,
/// which the next load could not parse back.
pub fn render(table: &ReturnsTable) -> Result<String, StoreError> {
    if let Some(bad) = table.iter().find(|cell| !cell.return_pct.is_finite()) {
        return Err(StoreError::NonFinite {
            year: bad.year,
            month: bad.month,
            value: bad.return_pct,
        });
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    table.serialize(&mut ser)?;
    buf.push(b'\n');
    // serde_json only emits UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// blake3 hex digest of persisted bytes.
pub fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Make the rename itself durable. Best effort: the new file is already in place.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::warn!(dir = %parent.display(), error = %e, "could not fsync store directory");
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()
}
