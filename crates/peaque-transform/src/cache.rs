//! Content-hash addressed disk cache for transform outputs.
//!
//! Layout on disk: one index file `index.json` holding
//! `{format_version, entries: [{key, content_hash, timestamp}]}` and one
//! payload file per `(key, content_hash)` pair named
//! `<safe(key)>.<hash12>.cache`. A persisted index whose version differs
//! from [`CACHE_FORMAT_VERSION`] drops the whole directory on load.
//!
//! Cache I/O failures are transient: the producer runs and its value is
//! returned uncached, with a warning.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use peaque_fs::FileSystem;

use crate::{TransformError, TransformResult};

/// Bump when the persisted layout or transform semantics change.
pub const CACHE_FORMAT_VERSION: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct IndexEntry {
    key: String,
    content_hash: String,
    timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    format_version: u32,
    entries: Vec<IndexEntry>,
}

/// Disk cache keyed by `(key, content_hash)`.
pub struct TransformCache {
    fs: Arc<dyn FileSystem>,
    dir: PathBuf,
    entries: Mutex<FxHashMap<String, IndexEntry>>,
    /// Serializes duplicate concurrent producers per key.
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TransformCache {
    /// Open the cache at `dir`, applying the version gate.
    pub fn load(fs: Arc<dyn FileSystem>, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let entries = match read_index(fs.as_ref(), &dir) {
            Some(index) if index.format_version == CACHE_FORMAT_VERSION => index
                .entries
                .into_iter()
                .map(|e| (e.key.clone(), e))
                .collect(),
            Some(_) => {
                purge_dir(fs.as_ref(), &dir);
                FxHashMap::default()
            }
            None => FxHashMap::default(),
        };
        TransformCache { fs, dir, entries: Mutex::new(entries), locks: Mutex::new(FxHashMap::default()) }
    }

    /// Return the cached bytes for `(key, content_hash)`, or run
    /// `producer`, persist its output, and return it. Concurrent callers
    /// for the same key are serialized so the producer runs once.
    pub async fn get_or_produce<F, Fut>(
        &self,
        key: &str,
        content_hash: &str,
        producer: F,
    ) -> TransformResult<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TransformResult<Vec<u8>>>,
    {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        if let Some(bytes) = self.lookup(key, content_hash) {
            return Ok(bytes);
        }

        let value = producer().await?;
        self.store(key, content_hash, &value);
        Ok(value)
    }

    /// Drop a key (used when a watcher reports a delete).
    pub fn invalidate(&self, key: &str) {
        let removed = self.entries.lock().remove(key);
        if let Some(entry) = removed {
            let path = self.payload_path(&entry.key, &entry.content_hash);
            if let Err(err) = self.fs.remove_file(&path) {
                if !err.is_not_found() {
                    warn!(key, %err, "failed to remove cache payload");
                }
            }
            self.write_index();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn lookup(&self, key: &str, content_hash: &str) -> Option<Vec<u8>> {
        {
            let entries = self.entries.lock();
            let entry = entries.get(key)?;
            if entry.content_hash != content_hash {
                return None;
            }
        }
        match self.fs.read(&self.payload_path(key, content_hash)) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(key, %err, "cache payload unreadable, treating as miss");
                None
            }
        }
    }

    fn store(&self, key: &str, content_hash: &str, value: &[u8]) {
        let stale = {
            let entries = self.entries.lock();
            entries
                .get(key)
                .filter(|e| e.content_hash != content_hash)
                .map(|e| self.payload_path(&e.key, &e.content_hash))
        };
        if let Some(stale_path) = stale {
            if let Err(err) = self.fs.remove_file(&stale_path) {
                if !err.is_not_found() {
                    warn!(key, %err, "failed to delete stale cache payload");
                }
            }
        }

        let path = self.payload_path(key, content_hash);
        if let Err(err) = self.fs.write(&path, value) {
            warn!(key, %err, "failed to persist transform output, serving uncached");
            return;
        }

        self.entries.lock().insert(
            key.to_string(),
            IndexEntry {
                key: key.to_string(),
                content_hash: content_hash.to_string(),
                timestamp: unix_now(),
            },
        );
        self.write_index();
    }

    fn write_index(&self) {
        let mut entries: Vec<IndexEntry> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let index = CacheIndex { format_version: CACHE_FORMAT_VERSION, entries };
        let json = match serde_json::to_vec_pretty(&index) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "failed to serialize cache index");
                return;
            }
        };
        if let Err(err) = self.fs.write(&self.dir.join("index.json"), &json) {
            warn!(%err, "failed to write cache index");
        }
    }

    fn payload_path(&self, key: &str, content_hash: &str) -> PathBuf {
        let hash12 = &content_hash[..content_hash.len().min(12)];
        self.dir.join(format!("{}.{hash12}.cache", safe_key(key)))
    }
}

fn read_index(fs: &dyn FileSystem, dir: &Path) -> Option<CacheIndex> {
    let bytes = match fs.read(&dir.join("index.json")) {
        Ok(bytes) => bytes,
        Err(err) => {
            if !err.is_not_found() {
                warn!(%err, "cache index unreadable, starting empty");
            }
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(index) => Some(index),
        Err(err) => {
            warn!(%err, "cache index corrupted, starting empty");
            purge_dir(fs, dir);
            None
        }
    }
}

fn purge_dir(fs: &dyn FileSystem, dir: &Path) {
    let files = match peaque_fs::walk_files(fs, dir) {
        Ok(files) => files,
        Err(err) => {
            warn!(%err, "failed to enumerate cache directory for purge");
            return;
        }
    };
    for file in files {
        if let Err(err) = fs.remove_file(&file) {
            warn!(path = %file.display(), %err, "failed to purge cache file");
        }
    }
}

/// File-name-safe form of a cache key.
fn safe_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peaque_fs::MemoryFileSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mem_cache() -> (Arc<MemoryFileSystem>, TransformCache) {
        let fs: Arc<MemoryFileSystem> = Arc::new(MemoryFileSystem::new());
        let cache = TransformCache::load(fs.clone(), "/cache");
        (fs, cache)
    }

    #[tokio::test]
    async fn produces_once_for_same_key_and_hash() {
        let (_fs, cache) = mem_cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let bytes = cache
                .get_or_produce("src/app.ts", "abc123abc123", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(b"transformed".to_vec())
                })
                .await
                .unwrap();
            assert_eq!(bytes, b"transformed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn new_hash_reproduces_and_drops_old_payload() {
        let (fs, cache) = mem_cache();
        cache
            .get_or_produce("src/app.ts", "aaaaaaaaaaaa", || async { Ok(b"v1".to_vec()) })
            .await
            .unwrap();
        let old_payload = Path::new("/cache/src_app.ts.aaaaaaaaaaaa.cache");
        assert!(fs.is_file(old_payload));

        let calls = AtomicUsize::new(0);
        let bytes = cache
            .get_or_produce("src/app.ts", "bbbbbbbbbbbb", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(b"v2".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"v2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!fs.exists(old_payload));
        assert!(fs.is_file(Path::new("/cache/src_app.ts.bbbbbbbbbbbb.cache")));
    }

    #[tokio::test]
    async fn persists_across_reload() {
        let fs: Arc<MemoryFileSystem> = Arc::new(MemoryFileSystem::new());
        {
            let cache = TransformCache::load(fs.clone(), "/cache");
            cache
                .get_or_produce("k", "cafecafecafe", || async { Ok(b"payload".to_vec()) })
                .await
                .unwrap();
        }
        let cache = TransformCache::load(fs.clone(), "/cache");
        let calls = AtomicUsize::new(0);
        let bytes = cache
            .get_or_produce("k", "cafecafecafe", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(b"fresh".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"payload");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn version_mismatch_purges_everything() {
        let fs: Arc<MemoryFileSystem> = Arc::new(MemoryFileSystem::new());
        let index = serde_json::json!({
            "format_version": CACHE_FORMAT_VERSION - 1,
            "entries": [{"key": "k", "content_hash": "cafecafecafe", "timestamp": 1}],
        });
        fs.write(Path::new("/cache/index.json"), index.to_string().as_bytes()).unwrap();
        fs.write(Path::new("/cache/k.cafecafecafe.cache"), b"old").unwrap();

        let cache = TransformCache::load(fs.clone(), "/cache");
        assert!(cache.is_empty());
        assert!(!fs.exists(Path::new("/cache/k.cafecafecafe.cache")));
    }

    #[tokio::test]
    async fn corrupted_index_starts_empty() {
        let fs: Arc<MemoryFileSystem> = Arc::new(MemoryFileSystem::new());
        fs.write(Path::new("/cache/index.json"), b"{ not json").unwrap();
        let cache = TransformCache::load(fs.clone(), "/cache");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn missing_payload_degrades_to_producer() {
        let (fs, cache) = mem_cache();
        cache
            .get_or_produce("k", "deadbeefdead", || async { Ok(b"v1".to_vec()) })
            .await
            .unwrap();
        fs.remove_file(Path::new("/cache/k.deadbeefdead.cache")).unwrap();

        let bytes = cache
            .get_or_produce("k", "deadbeefdead", || async { Ok(b"v2".to_vec()) })
            .await
            .unwrap();
        assert_eq!(bytes, b"v2");
    }

    #[tokio::test]
    async fn producer_errors_propagate_and_cache_nothing() {
        let (_fs, cache) = mem_cache();
        let result = cache
            .get_or_produce("k", "deadbeefdead", || async {
                Err(TransformError::Source("export updateUser is not async".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_producers_for_same_key_run_once() {
        let (_fs, cache) = mem_cache();
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_produce("shared", "feedfeedfeed", move || {
                        let calls = Arc::clone(&calls);
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::task::yield_now().await;
                            Ok(b"once".to_vec())
                        }
                    })
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), b"once");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn safe_key_replaces_separators() {
        assert_eq!(safe_key("src/pages/[id]/page.tsx"), "src_pages__id__page.tsx");
    }

    #[tokio::test]
    async fn invalidate_removes_entry_and_payload() {
        let (fs, cache) = mem_cache();
        cache
            .get_or_produce("k", "abcdefabcdef", || async { Ok(b"v".to_vec()) })
            .await
            .unwrap();
        cache.invalidate("k");
        assert!(cache.is_empty());
        assert!(!fs.exists(Path::new("/cache/k.abcdefabcdef.cache")));
    }

    #[tokio::test]
    async fn works_on_real_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let fs: Arc<peaque_fs::RealFileSystem> = Arc::new(peaque_fs::RealFileSystem::new());
        let cache = TransformCache::load(fs.clone(), dir.path());
        cache
            .get_or_produce("src/app.ts", "0123456789abcdef", || async { Ok(b"real".to_vec()) })
            .await
            .unwrap();

        let reloaded = TransformCache::load(fs, dir.path());
        let bytes = reloaded
            .get_or_produce("src/app.ts", "0123456789abcdef", || async {
                panic!("must hit the cache")
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"real");
    }
}
