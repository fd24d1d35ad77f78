//! Root-walk discovery: finds plugin manifests, validates them, and computes the
//! source hash used for drift detection.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::kernel::constants::MANIFEST_FILE_NAME;
use crate::plugin::error::PluginSystemError;
use crate::plugin::manifest::PluginManifest;
use crate::plugin::model::{Plugin, PluginMetadata};
use crate::storage::StorageProvider;

pub struct DiscoveryReport {
    pub plugins: Vec<Plugin>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct DiscoveryService {
    storage: Arc<dyn StorageProvider>,
}

impl DiscoveryService {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self { storage }
    }

    /// Walks each root recursively; a directory containing `plugin.json` directly
    /// is treated as a plugin root and is not descended into further.
    pub fn discover_roots(&self, roots: &[PathBuf]) -> DiscoveryReport {
        let mut plugins = Vec::new();
        let mut warnings = Vec::new();
        for root in roots {
            self.discover_dir(root, &mut plugins, &mut warnings);
        }
        DiscoveryReport { plugins, warnings }
    }

    fn discover_dir(&self, dir: &Path, plugins: &mut Vec<Plugin>, warnings: &mut Vec<String>) {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        if self.storage.is_file(&manifest_path) {
            match self.load_plugin(dir, &manifest_path) {
                Ok(plugin) => plugins.push(plugin),
                Err(e) => warnings.push(e.to_string()),
            }
            return;
        }
        let entries = match self.storage.read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries {
            if self.storage.is_dir(&entry) {
                self.discover_dir(&entry, plugins, warnings);
            }
        }
    }

    fn load_plugin(&self, root: &Path, manifest_path: &Path) -> Result<Plugin, PluginSystemError> {
        let text = self
            .storage
            .read_to_string(manifest_path)
            .map_err(|e| PluginSystemError::ManifestParse {
                path: manifest_path.to_path_buf(),
                message: e.to_string(),
            })?;
        let last_modified = self
            .storage
            .metadata(manifest_path)
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        let manifest = PluginManifest::parse(manifest_path, last_modified, &text)?;

        let source_hash = self.hash_source_tree(root)?;
        let mut plugin = Plugin::new(
            PluginMetadata {
                name: manifest.name.clone(),
                version: manifest.version.clone(),
                description: manifest.description.clone(),
                language: manifest.language,
            },
            manifest.entry_point.clone(),
            root.to_path_buf(),
            source_hash,
        );
        plugin.capabilities = manifest.capabilities;
        plugin.dependencies = manifest.dependencies;
        plugin.default_configuration = manifest.configuration;

        self.validate_entry_point(&mut plugin);
        Ok(plugin)
    }

    /// Entry-point existence and language-specific extension check. A failure
    /// marks the plugin Error rather than discarding it.
    fn validate_entry_point(&self, plugin: &mut Plugin) {
        let entry_point_abs = plugin.entry_point_absolute();
        if !self.storage.is_file(&entry_point_abs) {
            plugin.mark_error(format!(
                "entry point '{}' does not exist under the plugin root",
                plugin.entry_point.display()
            ));
            return;
        }
        let expected_ext = plugin.metadata.language.expected_entry_point_extension();
        let actual_ext = plugin
            .entry_point
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if actual_ext != expected_ext {
            plugin.mark_error(format!(
                "entry point '{}' has extension '.{actual_ext}', expected '.{expected_ext}' for language {}",
                plugin.entry_point.display(),
                plugin.metadata.language
            ));
            return;
        }
        plugin.mark_available();
    }

    /// SHA-256 over all source files under `root`, sorted by relative path, each
    /// contributing path-bytes + NUL + content.
    pub fn hash_source_tree(&self, root: &Path) -> Result<String, PluginSystemError> {
        let mut files = self
            .storage
            .walk_files(root)
            .map_err(|e| PluginSystemError::HashingFailed {
                path: root.to_path_buf(),
                message: e.to_string(),
            })?;
        files.sort();

        let mut hasher = Sha256::new();
        for rel in &files {
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            let abs = root.join(rel);
            let content = self
                .storage
                .read_to_bytes(&abs)
                .map_err(|e| PluginSystemError::HashingFailed {
                    path: abs.clone(),
                    message: e.to_string(),
                })?;
            hasher.update(&content);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Re-hashes `plugin`'s source tree; if the hash changed, or the plugin is
    /// currently in `Error`, re-runs the entry-point/extension check. Returns
    /// whether the source had drifted.
    pub fn revalidate(&self, plugin: &mut Plugin) -> Result<bool, PluginSystemError> {
        let new_hash = self.hash_source_tree(&plugin.root)?;
        let drifted = new_hash != plugin.source_hash;
        if !drifted && plugin.is_available() {
            return Ok(false);
        }
        plugin.source_hash = new_hash;
        self.validate_entry_point(plugin);
        Ok(drifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorageProvider;
    use tempfile::TempDir;

    fn write_manifest(root: &Path, language: &str, entry_point: &str) {
        std::fs::write(
            root.join("plugin.json"),
            format!(
                r#"{{"name":"Greeter","version":"1.0.0","language":"{language}","entryPoint":"{entry_point}"}}"#
            ),
        )
        .unwrap();
    }

    #[test]
    fn discovers_valid_plugin() {
        let tmp = TempDir::new().unwrap();
        let plugin_dir = tmp.path().join("greeter");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        write_manifest(&plugin_dir, "compiled", "hello.ext");
        std::fs::write(plugin_dir.join("hello.ext"), "source").unwrap();

        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let discovery = DiscoveryService::new(storage);
        let report = discovery.discover_roots(&[tmp.path().to_path_buf()]);

        assert!(report.warnings.is_empty());
        assert_eq!(report.plugins.len(), 1);
        assert!(report.plugins[0].is_available());
    }

    #[test]
    fn missing_entry_point_marks_error_without_discarding() {
        let tmp = TempDir::new().unwrap();
        let plugin_dir = tmp.path().join("broken");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        write_manifest(&plugin_dir, "compiled", "missing.ext");

        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let discovery = DiscoveryService::new(storage);
        let report = discovery.discover_roots(&[tmp.path().to_path_buf()]);

        assert_eq!(report.plugins.len(), 1);
        assert!(!report.plugins[0].is_available());
        assert!(report.plugins[0].last_error.is_some());
    }

    #[test]
    fn source_hash_changes_when_content_changes() {
        let tmp = TempDir::new().unwrap();
        let plugin_dir = tmp.path().join("greeter");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        write_manifest(&plugin_dir, "compiled", "hello.ext");
        std::fs::write(plugin_dir.join("hello.ext"), "source-v1").unwrap();

        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let discovery = DiscoveryService::new(storage);
        let hash_before = discovery.hash_source_tree(&plugin_dir).unwrap();

        std::fs::write(plugin_dir.join("hello.ext"), "source-v2").unwrap();
        let hash_after = discovery.hash_source_tree(&plugin_dir).unwrap();

        assert_ne!(hash_before, hash_after);
    }

    #[test]
    fn revalidate_detects_drift_and_keeps_available_on_success() {
        let tmp = TempDir::new().unwrap();
        let plugin_dir = tmp.path().join("greeter");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        write_manifest(&plugin_dir, "compiled", "hello.ext");
        std::fs::write(plugin_dir.join("hello.ext"), "source-v1").unwrap();

        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let discovery = DiscoveryService::new(storage);
        let mut plugin = discovery.load_plugin(&plugin_dir, &plugin_dir.join("plugin.json")).unwrap();
        assert!(plugin.is_available());

        assert!(!discovery.revalidate(&mut plugin).unwrap());

        std::fs::write(plugin_dir.join("hello.ext"), "source-v2").unwrap();
        assert!(discovery.revalidate(&mut plugin).unwrap());
        assert!(plugin.is_available());
    }
}
