use crate::cache::Inner;
use crate::error::{ErrorKind, Result};
use crate::snapshot::Snapshot;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Exclusive writer for one cache key.
///
/// Bytes go to a temporary file next to the final blob; nothing is visible to
/// readers until [`commit`](Self::commit) or
/// [`commit_and_open_snapshot`](Self::commit_and_open_snapshot) renames it
/// into place. Dropping an editor without committing aborts it.
pub struct Editor {
    inner: Arc<Inner>,
    key: String,
    hash: String,
    tmp_path: PathBuf,
    file: Option<fs::File>,
    written: u64,
    committed: bool,
}

impl Editor {
    pub(crate) fn new(inner: Arc<Inner>, key: String, hash: String, tmp_path: PathBuf, file: fs::File) -> Self {
        Self { inner, key, hash, tmp_path, file: Some(file), written: 0, committed: false }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            exn::bail!(ErrorKind::Unavailable(self.tmp_path.clone()));
        };
        file.write_all(data).await.map_err(|e| ErrorKind::from_io(e, &self.tmp_path))?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Publish the written bytes.
    pub async fn commit(self) -> Result<()> {
        self.commit_and_open_snapshot().await.map(drop)
    }

    /// Publish the written bytes and return a snapshot of exactly what was
    /// committed, without a window in which another writer or an eviction
    /// could slip in between the commit and the read.
    pub async fn commit_and_open_snapshot(mut self) -> Result<Snapshot> {
        let Some(mut file) = self.file.take() else {
            exn::bail!(ErrorKind::Unavailable(self.tmp_path.clone()));
        };
        file.flush().await.map_err(|e| ErrorKind::from_io(e, &self.tmp_path))?;
        file.sync_all().await.map_err(|e| ErrorKind::from_io(e, &self.tmp_path))?;
        drop(file);

        // The handle follows the file through the rename, so once the blob is
        // in place only `publish` can fail, and it removes the blob if it does.
        let blob = std::fs::File::open(&self.tmp_path).map_err(|e| ErrorKind::from_io(e, &self.tmp_path))?;
        let blob_path = self.inner.blob_path(&self.hash);
        fs::rename(&self.tmp_path, &blob_path).await.map_err(|e| ErrorKind::from_io(e, &blob_path))?;
        let committed_at = self.inner.publish(&self.key, &self.hash, self.written)?;
        self.committed = true;
        Ok(Snapshot::new(self.key.clone(), blob_path, self.written, committed_at, blob))
    }

    /// Discard everything written and release the key for other editors.
    pub fn abort(self) {}
}

impl Drop for Editor {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            if let Err(e) = std::fs::remove_file(&self.tmp_path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %self.tmp_path.display(), error = %e, "could not remove aborted edit");
            }
            tracing::debug!(key = %self.key, "aborted disk cache edit");
        }
        self.inner.finish_edit(&self.hash);
    }
}
