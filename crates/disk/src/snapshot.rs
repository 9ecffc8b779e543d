use crate::error::{ErrorKind, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::io::AsyncReadExt;

/// Read-only handle on a committed cache entry.
///
/// The blob is opened when the snapshot is created, so it stays readable
/// even if the entry is evicted or replaced while the snapshot is alive.
#[derive(Debug)]
pub struct Snapshot {
    key: String,
    path: PathBuf,
    size: u64,
    committed_at: UtcDateTime,
    file: File,
}

impl Snapshot {
    pub(crate) fn new(key: String, path: PathBuf, size: u64, committed_at: UtcDateTime, file: File) -> Self {
        Self { key, path, size, committed_at, file }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Location of the blob at the time the snapshot was opened.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn committed_at(&self) -> UtcDateTime {
        self.committed_at
    }

    /// An async reader positioned at the start of the blob.
    ///
    /// Readers obtained from the same snapshot share one file cursor; read
    /// them one at a time.
    pub fn reader(&self) -> Result<tokio::fs::File> {
        let mut file = self.file.try_clone().map_err(|e| ErrorKind::from_io(e, &self.path))?;
        file.seek(SeekFrom::Start(0)).map_err(ErrorKind::Io)?;
        Ok(tokio::fs::File::from_std(file))
    }

    pub async fn read_all(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(self.size as usize);
        self.reader()?.read_to_end(&mut buffer).await.map_err(ErrorKind::Io)?;
        Ok(buffer)
    }
}
