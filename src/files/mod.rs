//! File registry: virtual paths mapped to local files and directories.
//!
//! # Data Flow
//! ```text
//! bootstrap / master
//!     → attach("/var/log/master", "/master/log")
//! http /files/browse?path=/master/log
//!     → resolve (longest attached prefix, no `..`)
//!     → read_dir / read chunk
//! ```
//!
//! # Design Decisions
//! - Concurrent map (DashMap) so the HTTP layer reads without locking the master
//! - Read-only: nothing here writes to disk
//! - Chunked reads with a hard length cap

use dashmap::DashMap;
use serde::Serialize;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Largest chunk returned by a single read.
pub const MAX_READ_LENGTH: u64 = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("'{0}' is not attached")]
    NotFound(String),

    #[error("'{0}' is not a valid virtual path")]
    InvalidPath(String),

    #[error("'{0}' is a directory")]
    IsDirectory(String),

    #[error("'{0}' is not a directory")]
    NotDirectory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of a browsed directory.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Virtual path of the entry.
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    /// Seconds since the epoch.
    pub mtime: u64,
}

/// A chunk of file contents.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileChunk {
    pub offset: u64,
    pub data: String,
}

/// Registry of attached paths, shared by the master and the HTTP layer.
#[derive(Debug, Default)]
pub struct FileRegistry {
    attached: DashMap<String, PathBuf>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `path` under the virtual `name`.
    pub fn attach(&self, path: impl AsRef<Path>, name: &str) -> Result<(), FilesError> {
        let path = path.as_ref();
        let name = normalize(name)?;
        if !path.exists() {
            return Err(FilesError::NotFound(path.display().to_string()));
        }

        tracing::info!(path = %path.display(), name = %name, "Attached file");
        self.attached.insert(name, path.to_path_buf());
        Ok(())
    }

    pub fn detach(&self, name: &str) -> bool {
        normalize(name)
            .map(|name| self.attached.remove(&name).is_some())
            .unwrap_or(false)
    }

    pub fn attached(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attached.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Map a virtual path to a local one via the longest attached prefix.
    pub fn resolve(&self, virtual_path: &str) -> Result<PathBuf, FilesError> {
        let virtual_path = normalize(virtual_path)?;

        let mut best: Option<(usize, PathBuf)> = None;
        for entry in self.attached.iter() {
            let name = entry.key();
            let rest = if virtual_path == *name {
                Some("")
            } else {
                virtual_path
                    .strip_prefix(name.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
            };
            let Some(rest) = rest else {
                continue;
            };
            if best.as_ref().is_some_and(|(len, _)| *len >= name.len()) {
                continue;
            }
            let local = if rest.is_empty() {
                entry.value().clone()
            } else {
                entry.value().join(rest)
            };
            best = Some((name.len(), local));
        }

        best.map(|(_, local)| local)
            .ok_or(FilesError::NotFound(virtual_path))
    }

    /// List an attached directory.
    pub async fn browse(&self, virtual_path: &str) -> Result<Vec<FileEntry>, FilesError> {
        let local = self.resolve(virtual_path)?;
        let base = normalize(virtual_path)?;

        let metadata = tokio::fs::metadata(&local).await?;
        if !metadata.is_dir() {
            return Err(FilesError::NotDirectory(base));
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&local).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(FileEntry {
                path: format!("{}/{}", base, entry.file_name().to_string_lossy()),
                size: metadata.len(),
                is_dir: metadata.is_dir(),
                mtime: metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Read up to `length` bytes at `offset`.
    ///
    /// Without an offset, returns the file size and no data so callers can tail.
    pub async fn read(
        &self,
        virtual_path: &str,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> Result<FileChunk, FilesError> {
        let local = self.resolve(virtual_path)?;
        let metadata = tokio::fs::metadata(&local).await?;
        if metadata.is_dir() {
            return Err(FilesError::IsDirectory(virtual_path.to_string()));
        }

        let size = metadata.len();
        let Some(offset) = offset else {
            return Ok(FileChunk {
                offset: size,
                data: String::new(),
            });
        };
        if offset >= size {
            return Ok(FileChunk {
                offset,
                data: String::new(),
            });
        }

        let length = length.unwrap_or(MAX_READ_LENGTH).min(MAX_READ_LENGTH).min(size - offset);
        let mut file = tokio::fs::File::open(&local).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(length as usize);
        file.take(length).read_to_end(&mut buf).await?;

        Ok(FileChunk {
            offset,
            data: String::from_utf8_lossy(&buf).into_owned(),
        })
    }
}

/// Absolute, no trailing slash, no `.`/`..` components.
fn normalize(virtual_path: &str) -> Result<String, FilesError> {
    let invalid = || FilesError::InvalidPath(virtual_path.to_string());

    let trimmed = virtual_path.trim();
    if !trimmed.starts_with('/') {
        return Err(invalid());
    }

    let mut normalized = String::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::RootDir => {}
            Component::Normal(part) => {
                normalized.push('/');
                normalized.push_str(part.to_str().ok_or_else(invalid)?);
            }
            _ => return Err(invalid()),
        }
    }

    if normalized.is_empty() {
        return Err(invalid());
    }
    Ok(normalized)
}
