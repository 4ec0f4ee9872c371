//! Disk-based image cache with staged, atomically committed writes.
//!
//! Layout of the cache directory:
//! - `cache.version`: format version, application cache version, value count
//! - `<key>.0`: committed raw bytes for an entry (value slot 0)
//! - `.tmp-*`: staging files of open transactions
//!
//! A transaction writes into a staging file and publishes it with a rename,
//! so readers see either the previous entry or the complete new one.
//! Staging files left behind by a crash are swept on open.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use filetime::FileTime;
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::ChunkSink;

/// Maximum disk cache size in bytes (50 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 50 * 1024 * 1024;

/// Value slot holding an entry's bytes. Entries have exactly one slot.
pub const DISK_CACHE_INDEX: usize = 0;

/// Number of value slots per entry.
pub const VALUE_COUNT: usize = 1;

const FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "cache.version";
const STAGING_PREFIX: &str = ".tmp-";

/// Returns the bytes available to this process on the filesystem holding `path`.
///
/// # Errors
/// Returns error if the filesystem cannot be queried.
pub fn usable_space(path: &Path) -> std::io::Result<u64> {
    fs2::available_space(path)
}

struct Index {
    entries: LruCache<CacheKey, u64>,
    size: u64,
    writing: HashSet<CacheKey>,
}

struct Shared {
    cache_dir: PathBuf,
    max_size: u64,
    index: Mutex<Index>,
}

impl Shared {
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{DISK_CACHE_INDEX}", key.as_str()))
    }

    /// Renames the staging file over the entry and updates the index.
    /// Runs under the index lock so eviction never races a publish. Blocking;
    /// call from the blocking pool.
    ///
    /// The entry just published is kept even if it alone exceeds capacity, so
    /// it can be read back once; the next publish evicts it.
    fn publish(&self, key: &CacheKey, staged: TempPath, size: u64) -> CacheResult<()> {
        let path = self.entry_path(key);
        let mut index = self.index.lock();
        staged
            .persist(&path)
            .map_err(|e| CacheError::IoError(format!("Failed to commit cache entry: {}", e.error)))?;

        if let Some(old) = index.entries.put(key.clone(), size) {
            index.size -= old;
        }
        index.size += size;
        debug!(key = %key, size, "Committed disk cache entry");

        for (victim, victim_size) in self.evict(&mut index, Some(key)) {
            let victim_path = self.entry_path(&victim);
            if let Err(e) = std::fs::remove_file(&victim_path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %victim_path.display(), error = %e, "Failed to remove evicted cache file");
            } else {
                debug!(key = %victim, size = victim_size, "Evicted from disk cache");
            }
        }
        Ok(())
    }

    /// Pops least recently used entries until the index fits, never popping
    /// `keep`. The caller deletes the returned files.
    fn evict(&self, index: &mut Index, keep: Option<&CacheKey>) -> Vec<(CacheKey, u64)> {
        let mut victims = Vec::new();
        if index.size <= self.max_size {
            return victims;
        }
        debug!(
            current_size = index.size,
            max_size = self.max_size,
            "Disk cache over limit, evicting"
        );
        while index.size > self.max_size {
            if keep.is_some() && index.entries.peek_lru().map(|(k, _)| k) == keep {
                break;
            }
            let Some((key, size)) = index.entries.pop_lru() else {
                break;
            };
            index.size -= size;
            victims.push((key, size));
        }
        victims
    }

    fn finish_write(&self, key: &CacheKey) {
        self.index.lock().writing.remove(key);
    }
}

/// Disk-based cache of raw image bytes, bounded by summed file size.
/// Cheap to clone; clones share one index.
#[derive(Clone)]
pub struct DiskImageCache {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.shared.cache_dir)
            .field("max_size", &self.shared.max_size)
            .finish_non_exhaustive()
    }
}

impl DiskImageCache {
    /// Opens the cache in `cache_dir` if the filesystem has more than
    /// `max_size` bytes free.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` when there is not enough free space or the
    /// directory cannot be prepared.
    pub async fn open(cache_dir: PathBuf, max_size: u64, app_version: u32) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir).await.map_err(|e| {
            CacheError::CacheUnavailable(format!("Failed to create cache dir: {e}"))
        })?;

        let usable = usable_space(&cache_dir).map_err(|e| {
            CacheError::CacheUnavailable(format!("Failed to query free space: {e}"))
        })?;
        if usable <= max_size {
            return Err(CacheError::CacheUnavailable(format!(
                "{usable} bytes free, {max_size} required"
            )));
        }

        Self::open_unchecked(cache_dir, max_size, app_version)
            .await
            .map_err(|e| CacheError::CacheUnavailable(e.to_string()))
    }

    async fn open_unchecked(cache_dir: PathBuf, max_size: u64, app_version: u32) -> CacheResult<Self> {
        let version_path = cache_dir.join(VERSION_FILE);
        let expected = format!("{FORMAT_VERSION}\n{app_version}\n{VALUE_COUNT}\n");
        let current = fs::read_to_string(&version_path).await.ok();

        if current.as_deref() != Some(expected.as_str()) {
            if current.is_some() {
                debug!(path = %cache_dir.display(), "Disk cache version changed, discarding entries");
            }
            Self::remove_all_files(&cache_dir).await?;
            fs::write(&version_path, expected.as_bytes()).await?;
        }

        let mut found: Vec<(CacheKey, std::time::SystemTime, u64)> = Vec::new();
        let mut entries = fs::read_dir(&cache_dir).await?;
        let slot_suffix = format!(".{DISK_CACHE_INDEX}");

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.starts_with(STAGING_PREFIX) {
                debug!(file = name, "Removing orphaned staging file");
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!(file = name, error = %e, "Failed to remove staging file");
                }
                continue;
            }

            let Some(key) = name
                .strip_suffix(slot_suffix.as_str())
                .and_then(CacheKey::from_raw)
            else {
                continue;
            };

            if let Ok(meta) = entry.metadata().await
                && meta.is_file()
            {
                let touched = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                found.push((key, touched, meta.len()));
            }
        }

        found.sort_by_key(|(_, time, _)| *time);

        let mut index = Index {
            entries: LruCache::unbounded(),
            size: 0,
            writing: HashSet::new(),
        };
        for (key, _, size) in found {
            index.size += size;
            index.entries.put(key, size);
        }

        let shared = Shared {
            cache_dir,
            max_size,
            index: Mutex::new(Index {
                entries: LruCache::unbounded(),
                size: 0,
                writing: HashSet::new(),
            }),
        };
        let victims = shared.evict(&mut index, None);
        *shared.index.lock() = index;
        for (key, size) in victims {
            let path = shared.entry_path(&key);
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove evicted cache file");
            } else {
                debug!(key = %key, size, "Evicted from disk cache");
            }
        }

        let cache = Self {
            shared: Arc::new(shared),
        };
        debug!(
            path = %cache.shared.cache_dir.display(),
            entries = cache.len(),
            size = cache.current_size(),
            "Opened disk cache"
        );
        Ok(cache)
    }

    async fn remove_all_files(cache_dir: &Path) -> CacheResult<()> {
        let mut entries = fs::read_dir(cache_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await.is_ok_and(|t| t.is_file())
                && let Err(e) = fs::remove_file(&path).await
            {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
        Ok(())
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.shared.cache_dir
    }

    /// Returns the capacity in bytes.
    #[must_use]
    pub fn max_size(&self) -> u64 {
        self.shared.max_size
    }

    /// Reads the committed bytes of an entry, marking it most recently used.
    pub async fn read(&self, key: &CacheKey) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }
        let known = self.shared.index.lock().entries.get(key).is_some();
        if !known {
            trace!(key = %key, "Disk cache miss");
            return None;
        }

        let path = self.shared.entry_path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Self::touch(path).await;
                Some(Bytes::from(bytes))
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = %key, error = %e, "Failed to read disk cache entry");
                }
                trace!(key = %key, "Disk cache miss");
                None
            }
        }
    }

    /// Bumps the modification time so recency survives a reopen; access
    /// times are not reliable on `noatime` mounts.
    async fn touch(path: PathBuf) {
        let touched = tokio::task::spawn_blocking(move || {
            filetime::set_file_mtime(&path, FileTime::now())
        })
        .await;
        if let Ok(Err(e)) = touched {
            trace!(error = %e, "Failed to touch disk cache entry");
        }
    }

    /// Opens a staged write for `key`.
    ///
    /// # Errors
    /// Returns `WriteInProgress` if another transaction holds the key, which
    /// callers treat as "skip writing", or an I/O error if staging fails.
    pub async fn begin_write(&self, key: &CacheKey) -> CacheResult<Transaction> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey("empty disk cache key".to_string()));
        }
        if !self.shared.index.lock().writing.insert(key.clone()) {
            trace!(key = %key, "Disk cache entry already being written");
            return Err(CacheError::WriteInProgress(key.to_string()));
        }

        let cache_dir = self.shared.cache_dir.clone();
        let staged = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(&cache_dir)
        })
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)));
        let (file, path) = match staged {
            Ok(named) => named.into_parts(),
            Err(e) => {
                self.shared.finish_write(key);
                return Err(CacheError::IoError(format!(
                    "Failed to create staging file: {e}"
                )));
            }
        };

        trace!(key = %key, staging = %path.display(), "Opened disk cache transaction");
        Ok(Transaction {
            shared: Arc::clone(&self.shared),
            key: key.clone(),
            file: Some(fs::File::from_std(file)),
            staged: Some(path),
            written: 0,
        })
    }

    /// Removes an entry. Returns true if it existed.
    pub async fn remove(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut index = self.shared.index.lock();
            let removed = index.entries.pop(key);
            if let Some(size) = removed {
                index.size -= size;
            }
            removed
        };
        if removed.is_none() {
            return false;
        }

        let path = self.shared.entry_path(key);
        if let Err(e) = fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(key = %key, error = %e, "Failed to remove disk cache entry");
        }
        debug!(key = %key, "Removed from disk cache");
        true
    }

    /// Removes every committed entry.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        let keys: Vec<CacheKey> = {
            let mut index = self.shared.index.lock();
            let keys = index.entries.iter().map(|(k, _)| k.clone()).collect();
            index.entries.clear();
            index.size = 0;
            keys
        };
        for key in &keys {
            let path = self.shared.entry_path(key);
            if let Err(e) = fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
        debug!(count = keys.len(), "Cleared disk cache");
        Ok(())
    }

    /// Returns the summed size of committed entries in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.shared.index.lock().size
    }

    /// Returns the number of committed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.index.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks whether a committed entry exists without touching recency.
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.shared.index.lock().entries.contains(key)
    }
}

/// A staged write. Dropping it without `commit` aborts it.
pub struct Transaction {
    shared: Arc<Shared>,
    key: CacheKey,
    file: Option<fs::File>,
    staged: Option<TempPath>,
    written: u64,
}

impl Transaction {
    /// The key being written.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Bytes staged so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Appends bytes to the staging file.
    ///
    /// # Errors
    /// Returns error if the staging file cannot be written.
    pub async fn write(&mut self, bytes: &[u8]) -> CacheResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CacheError::IoError("transaction already closed".to_string()))?;
        file.write_all(bytes)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to write staging file: {e}")))?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Publishes the staged bytes as the entry's new value.
    ///
    /// # Errors
    /// Returns error if the bytes cannot be synced or renamed into place; the
    /// previous value is then left untouched.
    pub async fn commit(mut self) -> CacheResult<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| CacheError::IoError(format!("Failed to flush staging file: {e}")))?;
            file.sync_all()
                .await
                .map_err(|e| CacheError::IoError(format!("Failed to sync staging file: {e}")))?;
        }
        let staged = self
            .staged
            .take()
            .ok_or_else(|| CacheError::IoError("transaction already closed".to_string()))?;
        let shared = Arc::clone(&self.shared);
        let key = self.key.clone();
        let written = self.written;
        tokio::task::spawn_blocking(move || shared.publish(&key, staged, written))
            .await
            .map_err(|e| CacheError::IoError(format!("Commit task failed: {e}")))??;
        Ok(written)
    }

    /// Discards the staged bytes.
    pub fn abort(self) {
        drop(self);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.file.take();
        if let Some(staged) = self.staged.take() {
            debug!(key = %self.key, written = self.written, "Aborted disk cache transaction");
            if let Err(e) = staged.close() {
                warn!(key = %self.key, error = %e, "Failed to remove staging file");
            }
        }
        self.shared.finish_write(&self.key);
    }
}

#[async_trait]
impl ChunkSink for Transaction {
    async fn write_chunk(&mut self, chunk: &[u8]) -> CacheResult<()> {
        self.write(chunk).await
    }
}

/// The disk tier as seen by the loader: present, or degraded for the rest of
/// the process lifetime.
#[derive(Debug, Clone)]
pub enum DiskTier {
    /// Disk cache opened successfully.
    Available(DiskImageCache),
    /// Disk cache could not be opened; every operation is a miss or no-op.
    Unavailable,
}

impl DiskTier {
    /// Opens the disk cache, degrading to `Unavailable` on failure.
    pub async fn open(cache_dir: PathBuf, max_size: u64, app_version: u32) -> Self {
        match DiskImageCache::open(cache_dir, max_size, app_version).await {
            Ok(cache) => Self::Available(cache),
            Err(e) => {
                warn!(error = %e, "Disk cache disabled, falling back to network-only loading");
                Self::Unavailable
            }
        }
    }

    /// Returns true when the disk cache is usable.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Reads an entry; always a miss when unavailable.
    pub async fn read(&self, key: &CacheKey) -> Option<Bytes> {
        match self {
            Self::Available(cache) => cache.read(key).await,
            Self::Unavailable => None,
        }
    }

    /// Opens a transaction.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` when degraded, else as [`DiskImageCache::begin_write`].
    pub async fn begin_write(&self, key: &CacheKey) -> CacheResult<Transaction> {
        match self {
            Self::Available(cache) => cache.begin_write(key).await,
            Self::Unavailable => Err(CacheError::CacheUnavailable(
                "disk cache disabled".to_string(),
            )),
        }
    }

    /// Removes an entry; no-op when unavailable.
    pub async fn remove(&self, key: &CacheKey) -> bool {
        match self {
            Self::Available(cache) => cache.remove(key).await,
            Self::Unavailable => false,
        }
    }

    /// Clears all entries; no-op when unavailable.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        match self {
            Self::Available(cache) => cache.clear().await,
            Self::Unavailable => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_cache(max_size: u64) -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::open(temp_dir.path().to_path_buf(), max_size, 1)
            .await
            .unwrap();
        (cache, temp_dir)
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::from_locator(s)
    }

    async fn put(cache: &DiskImageCache, k: &CacheKey, data: &[u8]) {
        let mut tx = cache.begin_write(k).await.unwrap();
        tx.write(data).await.unwrap();
        tx.commit().await.unwrap();
    }

    fn staging_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .count()
    }

    #[tokio::test]
    async fn test_commit_and_read() {
        let (cache, temp) = create_test_cache(1024 * 1024).await;
        let k = key("test1");

        put(&cache, &k, b"test image data").await;

        assert_eq!(cache.read(&k).await.unwrap().as_ref(), b"test image data");
        assert!(temp.path().join(format!("{k}.0")).exists());
        assert_eq!(staging_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        assert!(cache.read(&key("nonexistent")).await.is_none());
    }

    #[tokio::test]
    async fn test_second_writer_is_refused() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        let k = key("busy");

        let tx = cache.begin_write(&k).await.unwrap();
        let second = cache.begin_write(&k).await;
        assert!(matches!(second, Err(CacheError::WriteInProgress(_))));

        tx.abort();
        assert!(cache.begin_write(&k).await.is_ok());
    }

    #[tokio::test]
    async fn test_uncommitted_write_is_invisible() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        let k = key("pending");

        let mut tx = cache.begin_write(&k).await.unwrap();
        tx.write(b"partial").await.unwrap();
        assert!(cache.read(&k).await.is_none());

        tx.commit().await.unwrap();
        assert_eq!(cache.read(&k).await.unwrap().as_ref(), b"partial");
    }

    #[tokio::test]
    async fn test_abort_preserves_previous_value() {
        let (cache, temp) = create_test_cache(1024 * 1024).await;
        let k = key("stable");
        put(&cache, &k, b"old value").await;

        let mut tx = cache.begin_write(&k).await.unwrap();
        tx.write(b"new val").await.unwrap();
        assert_eq!(cache.read(&k).await.unwrap().as_ref(), b"old value");
        tx.abort();

        assert_eq!(cache.read(&k).await.unwrap().as_ref(), b"old value");
        assert_eq!(cache.current_size(), 9);
        assert_eq!(staging_files(temp.path()), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_aborts() {
        let (cache, temp) = create_test_cache(1024 * 1024).await;
        let k = key("dropped");

        {
            let mut tx = cache.begin_write(&k).await.unwrap();
            tx.write(b"half").await.unwrap();
        }

        assert!(cache.read(&k).await.is_none());
        assert!(cache.is_empty());
        assert_eq!(staging_files(temp.path()), 0);
        assert!(cache.begin_write(&k).await.is_ok());
    }

    #[tokio::test]
    async fn test_replace_updates_size() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        put(&cache, &key("a"), b"hello").await;
        put(&cache, &key("b"), b"world!").await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 11);

        put(&cache, &key("a"), b"hey").await;
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 9);
    }

    #[tokio::test]
    async fn test_eviction_deletes_oldest() {
        let (cache, temp) = create_test_cache(10).await;
        let (a, b) = (key("a"), key("b"));

        put(&cache, &a, b"123456").await;
        put(&cache, &b, b"123456").await;

        assert!(!cache.contains(&a));
        assert!(!temp.path().join(format!("{a}.0")).exists());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 6);
    }

    #[tokio::test]
    async fn test_read_resets_recency() {
        let (cache, _temp) = create_test_cache(12).await;
        let (a, b, c) = (key("a"), key("b"), key("c"));

        put(&cache, &a, b"12345").await;
        put(&cache, &b, b"12345").await;
        assert!(cache.read(&a).await.is_some());
        put(&cache, &c, b"12345").await;

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        put(&cache, &key("1"), b"data1").await;
        put(&cache, &key("2"), b"data2").await;

        assert!(cache.remove(&key("1")).await);
        assert!(!cache.remove(&key("1")).await);
        assert_eq!(cache.current_size(), 5);

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
        assert!(cache.read(&key("2")).await.is_none());
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_index_and_sweeps_staging() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        {
            let cache = DiskImageCache::open(dir.clone(), 1024 * 1024, 1).await.unwrap();
            put(&cache, &key("1"), b"abc").await;
            put(&cache, &key("2"), b"defg").await;
        }
        std::fs::write(dir.join(format!("{STAGING_PREFIX}crashed")), b"junk").unwrap();

        let cache = DiskImageCache::open(dir.clone(), 1024 * 1024, 1).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 7);
        assert_eq!(cache.read(&key("2")).await.unwrap().as_ref(), b"defg");
        assert_eq!(staging_files(&dir), 0);
    }

    #[tokio::test]
    async fn test_version_bump_discards_entries() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        {
            let cache = DiskImageCache::open(dir.clone(), 1024 * 1024, 1).await.unwrap();
            put(&cache, &key("1"), b"abc").await;
        }

        let cache = DiskImageCache::open(dir.clone(), 1024 * 1024, 2).await.unwrap();
        assert!(cache.is_empty());
        assert!(cache.read(&key("1")).await.is_none());
        assert!(!dir.join(format!("{}.0", key("1"))).exists());
    }

    #[tokio::test]
    async fn test_insufficient_space_degrades() {
        let temp = TempDir::new().unwrap();
        let result = DiskImageCache::open(temp.path().to_path_buf(), u64::MAX, 1).await;
        assert!(matches!(result, Err(CacheError::CacheUnavailable(_))));

        let tier = DiskTier::open(temp.path().to_path_buf(), u64::MAX, 1).await;
        assert!(!tier.is_available());
        assert!(tier.read(&key("1")).await.is_none());
        assert!(matches!(
            tier.begin_write(&key("1")).await,
            Err(CacheError::CacheUnavailable(_))
        ));
        assert!(!tier.remove(&key("1")).await);
        assert!(tier.clear().await.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_entry_survives_until_next_commit() {
        let (cache, temp) = create_test_cache(10).await;
        let (big, small) = (key("big"), key("small"));

        put(&cache, &big, b"0123456789abcdef").await;
        assert_eq!(cache.read(&big).await.unwrap().as_ref(), b"0123456789abcdef");
        assert_eq!(cache.current_size(), 16);

        put(&cache, &small, b"123").await;
        assert!(!cache.contains(&big));
        assert!(!temp.path().join(format!("{big}.0")).exists());
        assert!(cache.contains(&small));
        assert_eq!(cache.current_size(), 3);
    }

    #[tokio::test]
    async fn test_read_recency_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_path_buf();
        let (a, b, c) = (key("a"), key("b"), key("c"));
        {
            let cache = DiskImageCache::open(dir.clone(), 12, 1).await.unwrap();
            put(&cache, &a, b"12345").await;
            put(&cache, &b, b"12345").await;
            let old = filetime::FileTime::from_unix_time(1_000_000, 0);
            filetime::set_file_mtime(dir.join(format!("{a}.0")), old).unwrap();
            filetime::set_file_mtime(dir.join(format!("{b}.0")), old).unwrap();
            assert!(cache.read(&a).await.is_some());
        }

        let cache = DiskImageCache::open(dir.clone(), 12, 1).await.unwrap();
        put(&cache, &c, b"12345").await;

        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }
}
