use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::storage::error::Result;

/// Synchronous filesystem abstraction used throughout discovery, the dependency
/// cache, and per-plugin environment preparation. Kept synchronous (rather than
/// `tokio::fs`) because most call sites already run inside `spawn_blocking` or a
/// dedicated worker thread (archive extraction, source hashing).
///
/// Narrowed to the operations this engine's three call sites actually need:
/// discovery's manifest/entry-point walk, the dependency cache's lock-marker
/// bookkeeping, and scratch-directory creation/teardown. A generic read/write/
/// rename/handle-opening surface has no caller here and is not exposed.
pub trait StorageProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn read_to_bytes(&self, path: &Path) -> Result<Vec<u8>>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<()>;

    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Recursively lists every file (not directory) under `path`, relative to `path`.
    fn walk_files(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    fn metadata(&self, path: &Path) -> Result<std::fs::Metadata>;
}
