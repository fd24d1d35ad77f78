//! # Dependency Resolver
//!
//! Turns a plugin's declared dependencies into a [`ResolvedDependencyContext`]:
//! ecosystem packages are materialized into a content-addressed cache, sibling
//! plugins are looked up in the registry by name+version, file references are
//! checked for existence.
pub mod cache;
pub mod error;
pub mod graph;
pub mod registry_client;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::kernel::constants::LOCK_MARKER_FILE_NAME;
use crate::plugin::{DependencyKind, Plugin, PluginDependency, PluginRegistry, PluginStatus};
use crate::plugin::version::pick_highest;
use crate::storage::StorageProvider;

pub use cache::DependencyCache;
pub use error::{ResolverError, Result};
pub use registry_client::{EcosystemRegistryClient, FakeRegistryClient, HttpRegistryClient};

/// One materialized ecosystem package: concrete version, the artifact paths
/// discovered under its cache entry, the install path, and the platform tag
/// used to pick them.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub artifact_paths: Vec<PathBuf>,
    pub install_path: PathBuf,
    pub platform: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedSiblingReference {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedFileReference {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencyContext {
    pub packages: Vec<ResolvedPackage>,
    pub siblings: Vec<ResolvedSiblingReference>,
    pub files: Vec<ResolvedFileReference>,
    pub warnings: Vec<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Current host platform tag, used both as a cache-path component and to pick
/// which artifact subdirectory of an extracted package applies.
pub fn current_platform_tag() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

pub struct DependencyResolver {
    cache: DependencyCache,
    storage: Arc<dyn StorageProvider>,
    registry_clients: HashMap<DependencyKind, Arc<dyn EcosystemRegistryClient>>,
    plugin_registry: Arc<PluginRegistry>,
    platform: String,
}

impl DependencyResolver {
    pub fn new(
        cache_root: PathBuf,
        storage: Arc<dyn StorageProvider>,
        registry_clients: HashMap<DependencyKind, Arc<dyn EcosystemRegistryClient>>,
        plugin_registry: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            cache: DependencyCache::new(cache_root, storage.clone()),
            storage,
            registry_clients,
            plugin_registry,
            platform: current_platform_tag(),
        }
    }

    pub async fn resolve_plugin(&self, plugin: &Plugin) -> Result<ResolvedDependencyContext> {
        let mut context = ResolvedDependencyContext::default();

        for dep in &plugin.dependencies {
            match dep.kind {
                DependencyKind::SiblingPlugin => context.siblings.push(self.resolve_sibling(dep).await?),
                DependencyKind::FileReference => {
                    context
                        .files
                        .push(self.resolve_file(dep, &plugin.root)?);
                }
                _ => {
                    context.packages.push(self.resolve_package(dep).await?);
                }
            }
        }

        let graph = graph::traverse_sibling_graph(&self.plugin_registry, &plugin.dependencies).await;
        context.warnings.extend(graph.warnings);
        context.resolved_at = Some(Utc::now());
        Ok(context)
    }

    async fn resolve_package(&self, dep: &PluginDependency) -> Result<ResolvedPackage> {
        let client =
            self.registry_clients
                .get(&dep.kind)
                .ok_or_else(|| ResolverError::RegistryRequestFailed {
                    name: dep.name.clone(),
                    message: format!("no registry client configured for {}", dep.kind),
                })?;

        let concrete_version = self.pick_concrete_version(client.as_ref(), dep).await?;
        let entry = self
            .cache
            .entry_path(&dep.name, dep.specifier.as_str(), &self.platform, &concrete_version);

        if !self.cache.is_intact(&entry) {
            let _guard = self.cache.lock_entry(&entry).await;
            // Re-check: another task may have completed the download while we awaited the lock.
            if !self.cache.is_intact(&entry) {
                self.download_and_extract(client.as_ref(), &dep.name, &concrete_version, &entry)
                    .await?;
                self.cache.mark_intact(&entry)?;
            }
        }

        let artifact_paths = self.scan_artifacts(&entry)?;
        Ok(ResolvedPackage {
            name: dep.name.clone(),
            version: concrete_version,
            artifact_paths,
            install_path: entry,
            platform: self.platform.clone(),
        })
    }

    async fn pick_concrete_version(
        &self,
        client: &dyn EcosystemRegistryClient,
        dep: &PluginDependency,
    ) -> Result<String> {
        if let Some(exact) = exact_literal(dep) {
            return Ok(exact);
        }
        let versions = client
            .list_versions(&dep.name)
            .await
            .map_err(|e| ResolverError::RegistryRequestFailed {
                name: dep.name.clone(),
                message: e.to_string(),
            })?;
        pick_highest(&dep.specifier, &versions)
            .map(str::to_string)
            .ok_or_else(|| ResolverError::NoSatisfyingVersion {
                name: dep.name.clone(),
                specifier: dep.specifier.as_str().to_string(),
            })
    }

    async fn download_and_extract(
        &self,
        client: &dyn EcosystemRegistryClient,
        name: &str,
        version: &str,
        entry: &Path,
    ) -> Result<()> {
        let archive = tempfile::Builder::new()
            .prefix("devflow-dep-")
            .suffix(".tar.gz")
            .tempfile()
            .map_err(|e| ResolverError::DownloadFailed {
                name: name.to_string(),
                version: version.to_string(),
                message: e.to_string(),
            })?;
        let archive_path = archive.path().to_path_buf();
        client.download_archive(name, version, &archive_path).await?;

        self.storage
            .create_dir_all(entry)
            .map_err(|e| ResolverError::Io {
                path: entry.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            })?;
        extract_tar_gz(&archive_path, entry).map_err(|e| ResolverError::ExtractionFailed {
            name: name.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })?;
        // `archive` (a `NamedTempFile`) deletes itself on drop.
        Ok(())
    }

    /// Looks for artifacts under `<entry>/<platform>/`, falling back to `<entry>/`
    /// directly, plus a platform-qualified `runtimes/<platform>/` subtree.
    fn scan_artifacts(&self, entry: &Path) -> Result<Vec<PathBuf>> {
        let platform_dir = entry.join(&self.platform);
        let mut paths = if self.storage.is_dir(&platform_dir) {
            self.walk(&platform_dir)?
        } else {
            self.walk(entry)?
        };
        let runtime_dir = entry.join("runtimes").join(&self.platform);
        if self.storage.is_dir(&runtime_dir) {
            paths.extend(self.walk(&runtime_dir)?);
        }
        paths.retain(|p| p.file_name().and_then(|n| n.to_str()) != Some(LOCK_MARKER_FILE_NAME));
        Ok(paths)
    }

    fn walk(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.storage
            .walk_files(dir)
            .map(|rel| rel.into_iter().map(|r| dir.join(r)).collect())
            .map_err(|e| ResolverError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            })
    }

    async fn resolve_sibling(&self, dep: &PluginDependency) -> Result<ResolvedSiblingReference> {
        let candidates = self.plugin_registry.find_by_name(&dep.name).await;
        if candidates.is_empty() {
            return Err(ResolverError::SiblingNotFound { name: dep.name.clone() });
        }
        let versions: Vec<String> = candidates.iter().map(|p| p.metadata.version.clone()).collect();
        let best_version =
            pick_highest(&dep.specifier, &versions)
                .map(str::to_string)
                .ok_or_else(|| ResolverError::NoSatisfyingVersion {
                    name: dep.name.clone(),
                    specifier: dep.specifier.as_str().to_string(),
                })?;
        let plugin = candidates
            .iter()
            .find(|p| p.metadata.version == best_version)
            .expect("version came from this candidate list");
        if plugin.status != PluginStatus::Available {
            return Err(ResolverError::SiblingNotAvailable {
                name: dep.name.clone(),
                status: format!("{:?}", plugin.status),
            });
        }
        Ok(ResolvedSiblingReference {
            name: dep.name.clone(),
            version: best_version,
        })
    }

    fn resolve_file(&self, dep: &PluginDependency, plugin_root: &Path) -> Result<ResolvedFileReference> {
        let raw_path = dep
            .source
            .as_deref()
            .unwrap_or(&dep.name);
        let candidate = PathBuf::from(raw_path);
        let resolved = if candidate.is_absolute() {
            candidate
        } else {
            plugin_root.join(candidate)
        };
        if !self.storage.exists(&resolved) {
            return Err(ResolverError::FileNotFound { path: resolved });
        }
        Ok(ResolvedFileReference { path: resolved })
    }
}

fn exact_literal(dep: &PluginDependency) -> Option<String> {
    let raw = dep.specifier.as_str();
    let is_plain_numeric = !raw.is_empty()
        && raw != "*"
        && !raw.eq_ignore_ascii_case("latest")
        && !raw.starts_with(['^', '~', '>', '<', '='])
        && raw.split('.').all(|p| p.parse::<u64>().is_ok());
    is_plain_numeric.then(|| raw.to_string())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorageProvider;
    use tempfile::TempDir;

    #[tokio::test]
    async fn resolves_exact_version_without_querying_registry() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let client: Arc<dyn EcosystemRegistryClient> = Arc::new(FakeRegistryClient::new());
        let mut clients: HashMap<DependencyKind, Arc<dyn EcosystemRegistryClient>> = HashMap::new();
        clients.insert(DependencyKind::EcosystemPackageA, client);
        let registry = Arc::new(PluginRegistry::new());
        let resolver = DependencyResolver::new(tmp.path().to_path_buf(), storage, clients, registry);

        let dep = PluginDependency::parse("packageA:Library@1.2.3").unwrap();
        let version = resolver.pick_concrete_version(
            resolver.registry_clients.get(&DependencyKind::EcosystemPackageA).unwrap().as_ref(),
            &dep,
        ).await.unwrap();
        assert_eq!(version, "1.2.3");
    }

    #[tokio::test]
    async fn picks_highest_satisfying_version_from_registry() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let fake = FakeRegistryClient::with_versions("Frame", vec!["1.1.9", "1.2.0", "1.2.7", "1.3.0"]);
        let client: Arc<dyn EcosystemRegistryClient> = Arc::new(fake);
        let mut clients: HashMap<DependencyKind, Arc<dyn EcosystemRegistryClient>> = HashMap::new();
        clients.insert(DependencyKind::EcosystemPackageB, client);
        let registry = Arc::new(PluginRegistry::new());
        let resolver = DependencyResolver::new(tmp.path().to_path_buf(), storage, clients, registry);

        let dep = PluginDependency::parse("packageB:Frame@~1.2.0").unwrap();
        let resolved = resolver.resolve_package(&dep).await.unwrap();
        assert_eq!(resolved.version, "1.2.7");
        assert!(resolved.install_path.to_string_lossy().contains("1.2.7"));
    }

    #[tokio::test]
    async fn sibling_not_found_fails() {
        let tmp = TempDir::new().unwrap();
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let registry = Arc::new(PluginRegistry::new());
        let resolver = DependencyResolver::new(tmp.path().to_path_buf(), storage, HashMap::new(), registry);
        let dep = PluginDependency::parse("plugin:Missing@*").unwrap();
        assert!(resolver.resolve_sibling(&dep).await.is_err());
    }

    #[tokio::test]
    async fn file_reference_resolves_relative_to_plugin_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("helper.dat"), "x").unwrap();
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let registry = Arc::new(PluginRegistry::new());
        let resolver = DependencyResolver::new(tmp.path().to_path_buf(), storage, HashMap::new(), registry);
        let dep = PluginDependency::parse("file:helper.dat@*").unwrap();
        let resolved = resolver.resolve_file(&dep, tmp.path()).unwrap();
        assert_eq!(resolved.path, tmp.path().join("helper.dat"));
    }
}
