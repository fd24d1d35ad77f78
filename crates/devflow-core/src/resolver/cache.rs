//! Content-addressed dependency cache.
//!
//! Layout: `<cache-root>/dependencies/<name>/<specifier>/<platform>/<version>/`.
//! A `.devflow.lock` marker file inside an entry means it's intact; entries are
//! read freely by any number of concurrent callers, but the *first* write to an
//! uncached entry serializes behind an in-process per-path lock so two concurrent
//! requests for the same uncached dependency produce exactly one download.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

use crate::kernel::constants::{CACHE_DEPENDENCIES_DIR, LOCK_MARKER_FILE_NAME};
use crate::resolver::error::{Result, ResolverError};
use crate::storage::StorageProvider;

pub struct DependencyCache {
    root: PathBuf,
    storage: Arc<dyn StorageProvider>,
    locks: StdMutex<HashMap<PathBuf, Arc<TokioMutex<()>>>>,
}

impl DependencyCache {
    pub fn new(root: PathBuf, storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            root,
            storage,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn entry_path(&self, name: &str, specifier: &str, platform: &str, version: &str) -> PathBuf {
        self.root
            .join(CACHE_DEPENDENCIES_DIR)
            .join(sanitize(name))
            .join(sanitize(specifier))
            .join(sanitize(platform))
            .join(sanitize(version))
    }

    pub fn is_intact(&self, entry: &Path) -> bool {
        self.storage.is_file(&entry.join(LOCK_MARKER_FILE_NAME))
    }

    /// Acquires the per-entry lock, cloning (or creating) the shared mutex for
    /// this cache path out of the lock table before awaiting it, so the table
    /// itself is held only for the instant of the lookup.
    pub async fn lock_entry(&self, entry: &Path) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.locks.lock().expect("cache lock table poisoned");
            table
                .entry(entry.to_path_buf())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    pub fn mark_intact(&self, entry: &Path) -> Result<()> {
        self.storage
            .create_dir_all(entry)
            .map_err(|e| ResolverError::Io {
                path: entry.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            })?;
        self.storage
            .write_string(&entry.join(LOCK_MARKER_FILE_NAME), "")
            .map_err(|e| ResolverError::Io {
                path: entry.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            })
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorageProvider;
    use tempfile::TempDir;

    #[test]
    fn entry_path_sanitizes_components() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let cache = DependencyCache::new(tmp.path().to_path_buf(), storage);
        let entry = cache.entry_path("My Lib", "^1.2.3", "linux-x64", "1.2.7");
        assert!(entry.to_string_lossy().contains("My_Lib"));
        assert!(entry.to_string_lossy().contains("_1.2.3"));
    }

    #[tokio::test]
    async fn mark_intact_then_is_intact() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let cache = DependencyCache::new(tmp.path().to_path_buf(), storage);
        let entry = cache.entry_path("lib", "*", "linux-x64", "1.0.0");
        assert!(!cache.is_intact(&entry));
        cache.mark_intact(&entry).unwrap();
        assert!(cache.is_intact(&entry));
    }

    #[tokio::test]
    async fn concurrent_lock_requests_for_same_entry_serialize() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let cache = Arc::new(DependencyCache::new(tmp.path().to_path_buf(), storage));
        let entry = cache.entry_path("lib", "*", "linux-x64", "1.0.0");

        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let entry = entry.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = cache.lock_entry(&entry).await;
                let before = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                assert_eq!(before, 0, "overlapping critical section");
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }
}
