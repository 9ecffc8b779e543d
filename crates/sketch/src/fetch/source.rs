use crate::fetch::DataFrom;
use crate::fetch::error::{ErrorKind, IoResultExt, Result};
use async_trait::async_trait;
use exn::ResultExt;
use sketch_disk::Snapshot;
use std::fmt::Debug;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

pub type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Where fetched bytes can be read from.
///
/// Every method opens a fresh read from the start of the data, so a source
/// can be sniffed with [`read_head`](Self::read_head) and then read in full.
#[async_trait]
pub trait DataSource: Debug + Send + Sync {
    fn data_from(&self) -> DataFrom;

    /// The backing file, when the data already lives on the local disk.
    fn file(&self) -> Option<&Path> {
        None
    }

    async fn reader(&self) -> Result<BoxAsyncRead>;

    /// A `'static` blocking reader for use inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking). The async setup
    /// happens before returning.
    async fn sync_reader(&self) -> Result<BoxSyncRead>;

    async fn read_all(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.reader().await?.read_to_end(&mut buffer).await.or_raise(|| ErrorKind::Io(std::io::ErrorKind::Other))?;
        Ok(buffer)
    }

    /// Read at most `bytes` from the start. Shorter data is returned whole.
    async fn read_head(&self, bytes: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(bytes);
        self.reader()
            .await?
            .take(bytes as u64)
            .read_to_end(&mut buffer)
            .await
            .or_raise(|| ErrorKind::Io(std::io::ErrorKind::Other))?;
        Ok(buffer)
    }
}

#[derive(Debug, Clone)]
pub struct FileDataSource {
    path: PathBuf,
}

impl FileDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl DataSource for FileDataSource {
    fn data_from(&self) -> DataFrom {
        DataFrom::LocalFile
    }

    fn file(&self) -> Option<&Path> {
        Some(&self.path)
    }

    async fn reader(&self) -> Result<BoxAsyncRead> {
        let file = tokio::fs::File::open(&self.path).await.or_raise_io(&self.target())?;
        Ok(Box::new(file))
    }

    async fn sync_reader(&self) -> Result<BoxSyncRead> {
        let file = tokio::fs::File::open(&self.path).await.or_raise_io(&self.target())?;
        Ok(Box::new(file.into_std().await))
    }
}

/// Bytes already in memory.
#[derive(Clone)]
pub struct BytesDataSource {
    bytes: Arc<[u8]>,
    data_from: DataFrom,
}

impl BytesDataSource {
    pub fn new(bytes: impl Into<Arc<[u8]>>, data_from: DataFrom) -> Self {
        Self { bytes: bytes.into(), data_from }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Debug for BytesDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BytesDataSource").field("len", &self.bytes.len()).field("data_from", &self.data_from).finish()
    }
}

#[async_trait]
impl DataSource for BytesDataSource {
    fn data_from(&self) -> DataFrom {
        self.data_from
    }

    async fn reader(&self) -> Result<BoxAsyncRead> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }

    async fn sync_reader(&self) -> Result<BoxSyncRead> {
        Ok(Box::new(Cursor::new(self.bytes.clone())))
    }

    async fn read_all(&self) -> Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }

    async fn read_head(&self, bytes: usize) -> Result<Vec<u8>> {
        Ok(self.bytes[..bytes.min(self.bytes.len())].to_vec())
    }
}

/// A committed disk cache entry.
#[derive(Debug)]
pub struct DiskCacheDataSource {
    snapshot: Snapshot,
    data_from: DataFrom,
}

impl DiskCacheDataSource {
    /// `data_from` records where the bytes originally came from: a fresh
    /// download that was just written through the cache keeps
    /// [`DataFrom::Network`].
    pub fn new(snapshot: Snapshot, data_from: DataFrom) -> Self {
        Self { snapshot, data_from }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn file_handle(&self) -> Result<tokio::fs::File> {
        self.snapshot.reader().or_raise(|| ErrorKind::DiskCache)
    }
}

#[async_trait]
impl DataSource for DiskCacheDataSource {
    fn data_from(&self) -> DataFrom {
        self.data_from
    }

    fn file(&self) -> Option<&Path> {
        Some(self.snapshot.path())
    }

    async fn reader(&self) -> Result<BoxAsyncRead> {
        Ok(Box::new(self.file_handle()?))
    }

    async fn sync_reader(&self) -> Result<BoxSyncRead> {
        Ok(Box::new(self.file_handle()?.into_std().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_bytes_source() {
        let source = BytesDataSource::new(b"hello world".to_vec(), DataFrom::Memory);
        assert_eq!(source.read_head(5).await.unwrap(), b"hello");
        assert_eq!(source.read_head(100).await.unwrap(), b"hello world");
        let mut text = String::new();
        source.sync_reader().await.unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::File::create(&path).unwrap().write_all(b"0123456789").unwrap();
        let source = FileDataSource::new(&path);
        assert_eq!(source.file(), Some(path.as_path()));
        assert_eq!(source.read_head(4).await.unwrap(), b"0123");
        assert_eq!(source.read_all().await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileDataSource::new(dir.path().join("missing.png"));
        let err = source.read_all().await.unwrap_err();
        assert!(matches!(*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_disk_cache_source() {
        let dir = tempfile::tempdir().unwrap();
        let cache = sketch_disk::DiskCache::open(dir.path(), 1024, 1);
        let mut editor = cache.open_editor("k").await.unwrap().unwrap();
        editor.write(b"cached bytes").await.unwrap();
        let source = DiskCacheDataSource::new(editor.commit_and_open_snapshot().await.unwrap(), DataFrom::DownloadCache);
        assert_eq!(source.read_head(6).await.unwrap(), b"cached");
        // Each read starts over from the beginning.
        assert_eq!(source.read_all().await.unwrap(), b"cached bytes");
    }
}
