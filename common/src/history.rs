//! Persistent log of previously shown wallpapers.
//!
//! Stored as a JSON array of `{ "path": ..., "time": ... }` objects, oldest
//! first. The client appends after every successful `SET`; the daemon reads the
//! newest entry to restore the last wallpaper on startup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to read history file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse history file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write history file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A single history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub path: String,
    /// UNIX timestamp (seconds) of when the wallpaper was applied
    pub time: i64,
}

pub struct History {
    file: PathBuf,
    limit: usize,
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Open the history file, creating an empty one if it does not exist yet.
    pub fn open(file: impl AsRef<Path>, limit: usize) -> Result<Self, HistoryError> {
        let file = file.as_ref().to_path_buf();

        if !file.exists() {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent).map_err(|source| HistoryError::Write {
                    path: file.clone(),
                    source,
                })?;
            }
            fs::write(&file, "[]").map_err(|source| HistoryError::Write {
                path: file.clone(),
                source,
            })?;
        }

        let contents = fs::read_to_string(&file).map_err(|source| HistoryError::Read {
            path: file.clone(),
            source,
        })?;

        let entries = serde_json::from_str(&contents).map_err(|source| HistoryError::Parse {
            path: file.clone(),
            source,
        })?;

        Ok(Self {
            file,
            limit,
            entries,
        })
    }

    /// Record `path` as the newest entry, dropping the oldest beyond the limit.
    pub fn append(&mut self, path: impl Into<String>) -> Result<(), HistoryError> {
        self.entries.push(HistoryEntry {
            path: path.into(),
            time: chrono::Utc::now().timestamp(),
        });

        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }

        self.write()
    }

    /// Entry at `index`; negative indices count from the newest (-1 = latest).
    pub fn get(&self, index: isize) -> Option<&HistoryEntry> {
        let len = self.entries.len() as isize;
        let resolved = if index < 0 { len + index } else { index };

        if (0..len).contains(&resolved) {
            self.entries.get(resolved as usize)
        } else {
            None
        }
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write(&self) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(&self.entries).map_err(|e| HistoryError::Write {
            path: self.file.clone(),
            source: std::io::Error::other(e),
        })?;

        fs::write(&self.file, json).map_err(|source| HistoryError::Write {
            path: self.file.clone(),
            source,
        })
    }
}
