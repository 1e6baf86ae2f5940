/*!
 * Snapshot Persistence
 *
 * The whole store is loaded from a flat text file at startup and written
 * back wholesale at shutdown. One record per line: `<key> <value>`, where
 * the key ends at the first space and the value is the rest of the line.
 */

use crate::storage::Store;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing a snapshot file
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to open snapshot {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to the snapshot file on disk
#[derive(Debug, Clone)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store from the snapshot file
    ///
    /// The file must already exist. Blank lines are skipped; lines without
    /// a space separator or that are not valid UTF-8 are logged and
    /// skipped. A later record for the same key replaces an earlier one.
    pub fn load(&self) -> Result<Store, SnapshotError> {
        let file = File::open(&self.path).map_err(|source| SnapshotError::Open {
            path: self.path.clone(),
            source,
        })?;

        let mut reader = BufReader::new(file);
        let mut store = Store::new();
        let mut raw = Vec::new();
        let mut lineno = 0;
        loop {
            raw.clear();
            let n = reader
                .read_until(b'\n', &mut raw)
                .map_err(|source| SnapshotError::Read {
                    path: self.path.clone(),
                    source,
                })?;
            if n == 0 {
                break;
            }
            lineno += 1;

            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(_) => {
                    warn!(
                        "{}:{}: skipping record that is not valid UTF-8",
                        self.path.display(),
                        lineno
                    );
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match parse_record(line) {
                Some((k, v)) => store.set(k.to_string(), v.to_string()),
                None => warn!(
                    "{}:{}: skipping record without a value",
                    self.path.display(),
                    lineno
                ),
            }
        }

        info!("loaded {} keys from {}", store.len(), self.path.display());
        Ok(store)
    }

    /// Write every entry of `store` to the snapshot file
    ///
    /// Records go to a sibling temporary file which is synced and then
    /// renamed over the snapshot, so readers only ever see a complete file.
    /// A symlinked snapshot is resolved first: the link stays in place and
    /// the file it points at is replaced, keeping that file's permissions.
    /// The temporary file is removed if any step fails.
    pub fn save(&self, store: &Store) -> Result<(), SnapshotError> {
        let target = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let tmp = tmp_path(&target);

        if let Err(source) = write_replace(&tmp, &target, store) {
            let _ = std::fs::remove_file(&tmp);
            return Err(SnapshotError::Write {
                path: self.path.clone(),
                source,
            });
        }

        info!("database saved to {}", self.path.display());
        Ok(())
    }
}

fn write_replace(tmp: &Path, target: &Path, store: &Store) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp)?;
    if let Ok(meta) = std::fs::metadata(target) {
        file.set_permissions(meta.permissions())?;
    }

    let mut w = BufWriter::new(file);
    for (k, v) in store.iter() {
        writeln!(w, "{} {}", k, v)?;
    }
    let file = w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(tmp, target)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Split a snapshot line into key and value at the first space
///
/// Returns `None` when the line has no space or the key is empty.
pub fn parse_record(line: &str) -> Option<(&str, &str)> {
    match line.split_once(' ') {
        Some((k, v)) if !k.is_empty() => Some((k, v)),
        _ => None,
    }
}
