use crate::editor::Editor;
use crate::error::{ErrorKind, Result};
use crate::journal::{self, JournalWriter, Record, Replay};
use crate::lock::{KeyGuard, KeyLocks};
use crate::snapshot::Snapshot;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self as sync_fs, File};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::UtcDateTime;

/// Redundant journal records tolerated before the journal is compacted.
const COMPACT_THRESHOLD: usize = 2000;
const TMP_SUFFIX: &str = ".tmp";

struct EntryMeta {
    key: String,
    size: u64,
    committed_at: UtcDateTime,
    tick: u64,
}

#[derive(Default)]
struct State {
    journal: Option<JournalWriter>,
    entries: HashMap<String, EntryMeta>,
    recency: BTreeMap<u64, String>,
    editing: HashSet<String>,
    size: u64,
    tick: u64,
    redundant: usize,
}

impl State {
    fn insert(&mut self, hash: String, key: String, size: u64, committed_at: UtcDateTime) {
        self.remove(&hash);
        self.tick += 1;
        self.recency.insert(self.tick, hash.clone());
        self.size += size;
        self.entries.insert(hash, EntryMeta { key, size, committed_at, tick: self.tick });
    }

    fn touch(&mut self, hash: &str) {
        self.tick += 1;
        if let Some(entry) = self.entries.get_mut(hash) {
            self.recency.remove(&entry.tick);
            entry.tick = self.tick;
            self.recency.insert(self.tick, hash.to_string());
        }
    }

    fn remove(&mut self, hash: &str) -> Option<EntryMeta> {
        let entry = self.entries.remove(hash)?;
        self.recency.remove(&entry.tick);
        self.size = self.size.saturating_sub(entry.size);
        Some(entry)
    }

    /// One `CLEAN` record per live entry, in LRU order.
    fn live_records(&self) -> Vec<Record> {
        self.recency
            .values()
            .filter_map(|hash| {
                let entry = self.entries.get(hash)?;
                Some(Record::Clean {
                    hash: hash.clone(),
                    size: entry.size,
                    committed_at: entry.committed_at.unix_timestamp(),
                    key: entry.key.clone(),
                })
            })
            .collect()
    }
}

pub(crate) struct Inner {
    directory: PathBuf,
    max_size: u64,
    version: u32,
    state: Mutex<State>,
    locks: Arc<KeyLocks>,
}

impl Inner {
    pub(crate) fn blob_path(&self, hash: &str) -> PathBuf {
        self.directory.join(hash)
    }

    fn tmp_path(&self, hash: &str) -> PathBuf {
        self.directory.join(format!("{hash}{TMP_SUFFIX}"))
    }

    /// Record a committed blob, then evict down to the size budget.
    pub(crate) fn publish(&self, key: &str, hash: &str, size: u64) -> Result<UtcDateTime> {
        let mut state = self.state.lock();
        if state.journal.is_none() {
            _ = sync_fs::remove_file(self.blob_path(hash));
            exn::bail!(ErrorKind::Unavailable(self.directory.clone()));
        }
        let committed_at = UtcDateTime::now();
        if state.entries.contains_key(hash) {
            state.redundant += 1;
        }
        state.insert(hash.to_string(), key.to_string(), size, committed_at);
        let record = Record::Clean { hash: hash.to_string(), size, committed_at: committed_at.unix_timestamp(), key: key.to_string() };
        self.append(&mut state, &record);
        self.evict(&mut state);
        Ok(committed_at)
    }

    pub(crate) fn finish_edit(&self, hash: &str) {
        self.state.lock().editing.remove(hash);
    }

    /// Append to the journal; a failed write means the directory can no
    /// longer be trusted, so the cache degrades to a no-op.
    fn append(&self, state: &mut State, record: &Record) {
        let Some(journal) = state.journal.as_mut() else {
            return;
        };
        if let Err(e) = journal.append(record) {
            tracing::warn!(directory = %self.directory.display(), error = %e, "disk cache journal write failed; disabling cache");
            state.journal = None;
            state.entries.clear();
            state.recency.clear();
            state.size = 0;
            return;
        }
        if state.redundant >= COMPACT_THRESHOLD && state.redundant >= state.entries.len() {
            self.compact(state);
        }
    }

    fn compact(&self, state: &mut State) {
        match journal::rewrite(&self.directory, self.version, &state.live_records()) {
            Ok(writer) => {
                state.journal = Some(writer);
                state.redundant = 0;
                tracing::debug!(directory = %self.directory.display(), entries = state.entries.len(), "compacted disk cache journal");
            },
            Err(e) => tracing::warn!(directory = %self.directory.display(), error = %e, "could not compact disk cache journal"),
        }
    }

    fn evict(&self, state: &mut State) {
        while state.size > self.max_size {
            let Some(hash) = state.recency.values().next().cloned() else {
                break;
            };
            self.delete(state, &hash);
        }
    }

    fn delete(&self, state: &mut State, hash: &str) -> bool {
        let Some(entry) = state.remove(hash) else {
            return false;
        };
        if let Err(e) = sync_fs::remove_file(self.blob_path(hash))
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(key = %entry.key, error = %e, "could not delete disk cache blob");
        }
        tracing::debug!(key = %entry.key, size = entry.size, "evicted disk cache entry");
        state.redundant += 1;
        self.append(state, &Record::Remove { hash: hash.to_string() });
        true
    }
}

/// Persistent LRU cache of blobs keyed by string.
///
/// Blobs are content-addressed by the [`blake3`] hash of their key and
/// described by an append-only journal, which is replayed on open. The total
/// size of committed blobs is kept under `max_size` by evicting the least
/// recently used entries after every commit.
///
/// Cheap to clone; all clones share the same state.
///
/// # Examples
///
/// ```no_run
/// use sketch_disk::DiskCache;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = DiskCache::open("/tmp/sketch/result", 200 * 1024 * 1024, 1);
/// let key = "https://example.com/cat.png";
///
/// // Holding the key lock makes "read it, or else write it" atomic.
/// let _guard = cache.lock(key).await;
/// if cache.open_snapshot(key).is_none()
///     && let Some(mut editor) = cache.open_editor(key).await?
/// {
///     editor.write(b"...").await?;
///     let snapshot = editor.commit_and_open_snapshot().await?;
///     assert_eq!(snapshot.read_all().await?, b"...");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DiskCache {
    inner: Arc<Inner>,
}

impl DiskCache {
    /// Open (or create) a cache in `directory`.
    ///
    /// Never fails: if the directory cannot be created or the journal cannot
    /// be written, the returned cache is *unavailable* and behaves as an
    /// always-empty cache. A journal written with a different `version` wipes
    /// the directory.
    ///
    /// Blocking; call once at startup.
    pub fn open(directory: impl Into<PathBuf>, max_size: u64, version: u32) -> Self {
        let directory = directory.into();
        let mut state = State::default();
        match Self::load(&directory, version, &mut state) {
            Ok(()) => tracing::info!(
                directory = %directory.display(),
                entries = state.entries.len(),
                size = state.size,
                "opened disk cache"
            ),
            Err(e) => {
                tracing::warn!(directory = %directory.display(), error = %e, "disk cache unavailable");
                state = State::default();
            },
        }
        let inner = Inner { directory, max_size, version, state: Mutex::new(state), locks: Arc::default() };
        let mut state = inner.state.lock();
        inner.evict(&mut state);
        drop(state);
        Self { inner: Arc::new(inner) }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        let inner = Inner {
            directory: PathBuf::new(),
            max_size: 0,
            version: 0,
            state: Mutex::new(State::default()),
            locks: Arc::default(),
        };
        Self { inner: Arc::new(inner) }
    }

    fn load(directory: &Path, version: u32, state: &mut State) -> io::Result<()> {
        sync_fs::create_dir_all(directory)?;
        match journal::read(directory, version)? {
            Replay::Missing => {},
            Replay::Mismatch => {
                tracing::info!(directory = %directory.display(), version, "disk cache version changed; clearing");
                Self::wipe(directory)?;
            },
            Replay::Records(records, skipped) => {
                if skipped > 0 {
                    tracing::warn!(directory = %directory.display(), skipped, "skipped corrupt disk cache journal lines");
                }
                Self::replay(directory, records, state);
            },
        }
        Self::remove_orphans(directory, state)?;
        state.journal = Some(journal::rewrite(directory, version, &state.live_records())?);
        Ok(())
    }

    fn replay(directory: &Path, records: Vec<Record>, state: &mut State) {
        for record in records {
            match record {
                Record::Clean { hash, size, committed_at, key } => {
                    let committed_at = UtcDateTime::from_unix_timestamp(committed_at).unwrap_or(UtcDateTime::UNIX_EPOCH);
                    state.insert(hash, key, size, committed_at);
                },
                Record::Read { hash } => state.touch(&hash),
                Record::Remove { hash } => {
                    state.remove(&hash);
                },
            }
        }
        // Trust the filesystem over the journal.
        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(hash, entry)| {
                sync_fs::metadata(directory.join(hash)).map(|m| m.len() != entry.size).unwrap_or(true)
            })
            .map(|(hash, _)| hash.clone())
            .collect();
        for hash in stale {
            if let Some(entry) = state.remove(&hash) {
                tracing::warn!(key = %entry.key, "dropping disk cache entry with missing or truncated blob");
            }
        }
    }

    /// Delete anything in the directory that no live entry accounts for:
    /// leftover temporary files from a crash, stale blobs.
    fn remove_orphans(directory: &Path, state: &State) -> io::Result<()> {
        for dir_entry in sync_fs::read_dir(directory)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let name = name.to_string_lossy();
            if journal::is_journal_file(&name) || state.entries.contains_key(name.as_ref()) {
                continue;
            }
            if dir_entry.file_type()?.is_file() {
                sync_fs::remove_file(dir_entry.path())?;
            }
        }
        Ok(())
    }

    fn wipe(directory: &Path) -> io::Result<()> {
        for dir_entry in sync_fs::read_dir(directory)? {
            let dir_entry = dir_entry?;
            if dir_entry.file_type()?.is_dir() {
                sync_fs::remove_dir_all(dir_entry.path())?;
            } else {
                sync_fs::remove_file(dir_entry.path())?;
            }
        }
        Ok(())
    }

    fn hash(key: &str) -> String {
        blake3::hash(key.as_bytes()).to_hex().to_string()
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    pub fn version(&self) -> u32 {
        self.inner.version
    }

    pub fn max_size(&self) -> u64 {
        self.inner.max_size
    }

    /// Total size of committed blobs.
    pub fn size(&self) -> u64 {
        self.inner.state.lock().size
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `false` once the directory has proven unusable.
    pub fn is_available(&self) -> bool {
        self.inner.state.lock().journal.is_some()
    }

    /// Whether a committed entry exists for `key`. Does not count as an
    /// access.
    pub fn exists(&self, key: &str) -> bool {
        self.inner.state.lock().entries.contains_key(&Self::hash(key))
    }

    /// Open a read handle on the committed entry for `key`, marking it most
    /// recently used.
    ///
    /// An entry whose blob has vanished from disk is dropped and reported as
    /// absent.
    pub fn open_snapshot(&self, key: &str) -> Option<Snapshot> {
        let hash = Self::hash(key);
        let path = self.inner.blob_path(&hash);
        let mut state = self.inner.state.lock();
        let entry = state.entries.get(&hash)?;
        let (size, committed_at) = (entry.size, entry.committed_at);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(key, error = %e, "disk cache blob unreadable; dropping entry");
                self.inner.delete(&mut state, &hash);
                return None;
            },
        };
        state.touch(&hash);
        state.redundant += 1;
        self.inner.append(&mut state, &Record::Read { hash });
        Some(Snapshot::new(key.to_string(), path, size, committed_at, file))
    }

    /// Start writing a new value for `key`.
    ///
    /// Returns `Ok(None)` if another editor for the same key is still open
    /// (the other writer will produce the data; read it once it commits) or
    /// if the cache is unavailable.
    pub async fn open_editor(&self, key: &str) -> Result<Option<Editor>> {
        let hash = Self::hash(key);
        {
            let mut state = self.inner.state.lock();
            if state.journal.is_none() || !state.editing.insert(hash.clone()) {
                return Ok(None);
            }
        }
        let tmp_path = self.inner.tmp_path(&hash);
        match tokio::fs::File::create(&tmp_path).await {
            Ok(file) => Ok(Some(Editor::new(self.inner.clone(), key.to_string(), hash, tmp_path, file))),
            Err(e) => {
                self.inner.finish_edit(&hash);
                Err(ErrorKind::from_io(e, &tmp_path).into())
            },
        }
    }

    /// Remove the entry for `key`. Returns whether there was one.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.inner.state.lock();
        self.inner.delete(&mut state, &Self::hash(key))
    }

    /// Remove every committed entry. Open editors are unaffected and will
    /// still commit.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.journal.is_none() {
            return Ok(());
        }
        let hashes: Vec<String> = state.entries.keys().cloned().collect();
        for hash in &hashes {
            let path = self.inner.blob_path(hash);
            match sync_fs::remove_file(&path) {
                Ok(()) => {},
                Err(e) if e.kind() == io::ErrorKind::NotFound => {},
                Err(e) => return Err(ErrorKind::from_io(e, &path).into()),
            }
            state.remove(hash);
        }
        let writer =
            journal::rewrite(&self.inner.directory, self.inner.version, std::iter::empty()).map_err(ErrorKind::Io)?;
        state.journal = Some(writer);
        state.redundant = 0;
        tracing::info!(directory = %self.inner.directory.display(), count = hashes.len(), "cleared disk cache");
        Ok(())
    }

    /// Hold the per-key lock until the returned guard is dropped.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        self.inner.locks.lock(key).await
    }

    /// Run `f` while holding the per-key lock, making a check-snapshot-or-
    /// open-editor sequence atomic with respect to other callers using the
    /// same key.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock(key).await;
        f().await
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.inner.locks.len()
    }
}
