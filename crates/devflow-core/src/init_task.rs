//! One-shot startup discovery: walks the configured roots, registers newly
//! found plugins and updates the status of ones already known to the registry.
//! Runs once from [`start`](InitializationTask::start) and never blocks the
//! host on a single plugin's failure.
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;
use crate::plugin::{DiscoveryService, PluginRegistry};

#[derive(Debug)]
pub struct InitializationTask {
    discovery: Arc<DiscoveryService>,
    registry: Arc<PluginRegistry>,
    roots: Vec<PathBuf>,
}

impl InitializationTask {
    pub fn new(discovery: Arc<DiscoveryService>, registry: Arc<PluginRegistry>, roots: Vec<PathBuf>) -> Self {
        Self {
            discovery,
            registry,
            roots,
        }
    }

    /// Runs discovery over every configured root and folds the result into the
    /// registry: new plugin names are registered fresh, names already present
    /// are left alone (re-validation is the execution service's job, not startup's).
    pub async fn run(&self) -> usize {
        let report = self.discovery.discover_roots(&self.roots);
        for warning in &report.warnings {
            log::warn!("plugin discovery warning: {warning}");
        }

        let mut registered = 0;
        for plugin in report.plugins {
            let already_known = !self.registry.find_by_name(&plugin.metadata.name).await.is_empty();
            if already_known {
                log::info!("skipping already-registered plugin '{}'", plugin.metadata.name);
                continue;
            }
            log::info!(
                "registering plugin '{}' v{} ({})",
                plugin.metadata.name,
                plugin.metadata.version,
                plugin.metadata.language
            );
            self.registry.register(plugin).await;
            registered += 1;
        }
        registered
    }
}

#[async_trait]
impl KernelComponent for InitializationTask {
    fn name(&self) -> &'static str {
        "initialization-task"
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Performs the one-shot discovery sweep. A root that cannot be walked or
    /// a plugin that fails manifest validation is logged as a warning and
    /// skipped; it never aborts the sweep or fails startup.
    async fn start(&self) -> Result<()> {
        let registered = self.run().await;
        log::info!("startup discovery registered {registered} new plugin(s)");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalStorageProvider, StorageProvider};

    fn write_manifest(root: &std::path::Path, name: &str) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(
            root.join("plugin.json"),
            format!(r#"{{"name":"{name}","version":"1.0.0","language":"interpreted","entryPoint":"main.py"}}"#),
        )
        .unwrap();
        std::fs::write(root.join("main.py"), "def execute(ctx):\n    return ctx\n").unwrap();
    }

    #[tokio::test]
    async fn registers_every_discovered_plugin_once() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(&tmp.path().join("alpha"), "Alpha");
        write_manifest(&tmp.path().join("beta"), "Beta");

        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let discovery = Arc::new(DiscoveryService::new(storage));
        let registry = Arc::new(PluginRegistry::new());
        let task = InitializationTask::new(discovery, registry.clone(), vec![tmp.path().to_path_buf()]);

        let registered = task.run().await;
        assert_eq!(registered, 2);
        assert_eq!(registry.len().await, 2);

        // Running again does not duplicate the already-registered plugins.
        let registered_again = task.run().await;
        assert_eq!(registered_again, 0);
        assert_eq!(registry.len().await, 2);
    }
}
