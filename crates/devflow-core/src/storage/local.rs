use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::storage::error::{Result, StorageSystemError};
use crate::storage::provider::StorageProvider;

/// Local filesystem storage provider. `base_path` is joined onto every relative
/// path passed in; an empty base makes the provider operate directly on absolute
/// paths, which is how the cache and discovery layers use it.
#[derive(Clone)]
pub struct LocalStorageProvider {
    base_path: PathBuf,
}

impl LocalStorageProvider {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn resolve_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.base_path.join(path)
    }

    /// Writes `contents` via a same-directory tempfile + rename so a reader never
    /// observes a partially written manifest, lock marker, or dependency file.
    fn write_atomic(&self, full_path: &Path, contents: &[u8]) -> Result<()> {
        let parent = full_path
            .parent()
            .ok_or_else(|| StorageSystemError::NoParentDirectory(full_path.to_path_buf()))?;
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| StorageSystemError::io(e, "create_dir_all", parent.to_path_buf()))?;
        }

        let temp_dir = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
        let temp_file =
            NamedTempFile::new_in(temp_dir).map_err(|e| StorageSystemError::io(e, "create_temp_file", temp_dir.to_path_buf()))?;
        temp_file
            .as_file()
            .write_all(contents)
            .map_err(|e| StorageSystemError::io(e, "write_to_temp_file", temp_file.path().to_path_buf()))?;
        temp_file
            .persist(full_path)
            .map_err(|e| StorageSystemError::io(e.error, "persist_temp_file", full_path.to_path_buf()))?;
        Ok(())
    }
}

impl Default for LocalStorageProvider {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

impl StorageProvider for LocalStorageProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve_path(path).exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.resolve_path(path).is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.resolve_path(path).is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::create_dir_all(&full_path).map_err(|e| StorageSystemError::io(e, "create_dir_all", full_path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let full_path = self.resolve_path(path);
        fs::read_to_string(&full_path).map_err(|e| StorageSystemError::io(e, "read_to_string", full_path))
    }

    fn read_to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);
        fs::read(&full_path).map_err(|e| StorageSystemError::io(e, "read_to_bytes", full_path))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        self.write_atomic(&full_path, contents.as_bytes())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::remove_dir_all(&full_path).map_err(|e| StorageSystemError::io(e, "remove_dir_all", full_path))
    }

    fn walk_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let full_path = self.resolve_path(path);
        let mut out = Vec::new();
        walk_recursive(&full_path, &full_path, &mut out)?;
        Ok(out)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let full_path = self.resolve_path(path);
        let entries = fs::read_dir(&full_path).map_err(|e| StorageSystemError::io(e, "read_dir", full_path.clone()))?;
        let mut result = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageSystemError::io(e, "read_dir_entry", full_path.clone()))?;
            let entry_path = entry.path();
            if let Ok(rel_path) = entry_path.strip_prefix(&self.base_path) {
                result.push(rel_path.to_path_buf());
            } else {
                result.push(entry_path);
            }
        }
        Ok(result)
    }

    fn metadata(&self, path: &Path) -> Result<std::fs::Metadata> {
        let full_path = self.resolve_path(path);
        fs::metadata(&full_path).map_err(|e| StorageSystemError::io(e, "metadata", full_path))
    }
}

fn walk_recursive(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| StorageSystemError::io(e, "read_dir", dir.to_path_buf()))?;
    for entry in entries {
        let entry = entry.map_err(|e| StorageSystemError::io(e, "read_dir_entry", dir.to_path_buf()))?;
        let path = entry.path();
        if path.is_dir() {
            walk_recursive(root, &path, out)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_path_buf());
            }
        }
    }
    Ok(())
}

impl fmt::Debug for LocalStorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStorageProvider")
            .field("base_path", &self.base_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let provider = LocalStorageProvider::new(dir.path().to_path_buf());
        provider.write_string(Path::new("a.txt"), "hello").unwrap();
        assert_eq!(provider.read_to_string(Path::new("a.txt")).unwrap(), "hello");
    }

    #[test]
    fn walk_files_finds_nested_entries() {
        let dir = TempDir::new().unwrap();
        let provider = LocalStorageProvider::new(dir.path().to_path_buf());
        provider.create_dir_all(Path::new("sub")).unwrap();
        provider.write_string(Path::new("top.txt"), "a").unwrap();
        provider.write_string(Path::new("sub/nested.txt"), "b").unwrap();

        let mut files = provider.walk_files(Path::new(".")).unwrap();
        files.sort();
        assert_eq!(files, vec![PathBuf::from("sub/nested.txt"), PathBuf::from("top.txt")]);
    }

    #[test]
    fn remove_dir_all_on_missing_path_reports_io_error() {
        let dir = TempDir::new().unwrap();
        let provider = LocalStorageProvider::new(dir.path().to_path_buf());
        let err = provider.remove_dir_all(Path::new("never-created")).unwrap_err();
        assert!(matches!(err, StorageSystemError::Io { .. }));
    }
}
