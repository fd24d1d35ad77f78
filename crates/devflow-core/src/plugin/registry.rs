//! In-memory plugin registry: owns every discovered [`Plugin`] for the lifetime
//! of the process. Reads are cheap; writes serialize through a single mutex.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result;
use crate::plugin::model::{Plugin, PluginId, PluginStatus};

#[derive(Debug)]
pub struct PluginRegistry {
    plugins: Mutex<HashMap<PluginId, Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, plugin: Plugin) -> PluginId {
        let id = plugin.id;
        self.plugins.lock().await.insert(id, plugin);
        id
    }

    pub async fn get(&self, id: PluginId) -> Option<Plugin> {
        self.plugins.lock().await.get(&id).cloned()
    }

    /// Applies `f` to the stored plugin and persists the mutation, returning
    /// whether a plugin with that id was found.
    pub async fn update<F: FnOnce(&mut Plugin)>(&self, id: PluginId, f: F) -> bool {
        let mut guard = self.plugins.lock().await;
        match guard.get_mut(&id) {
            Some(plugin) => {
                f(plugin);
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: PluginId) -> Option<Plugin> {
        self.plugins.lock().await.remove(&id)
    }

    pub async fn all(&self) -> Vec<Plugin> {
        self.plugins.lock().await.values().cloned().collect()
    }

    /// All plugins with `status == Available`.
    pub async fn all_available(&self) -> Vec<Plugin> {
        self.plugins
            .lock()
            .await
            .values()
            .filter(|p| p.status == PluginStatus::Available)
            .cloned()
            .collect()
    }

    /// Every registered plugin (any status) matching `name`, used by sibling-plugin
    /// dependency resolution (which then filters by version satisfaction).
    pub async fn find_by_name(&self, name: &str) -> Vec<Plugin> {
        self.plugins
            .lock()
            .await
            .values()
            .filter(|p| p.metadata.name == name)
            .cloned()
            .collect()
    }

    pub async fn contains(&self, id: PluginId) -> bool {
        self.plugins.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.plugins.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KernelComponent for PluginRegistry {
    fn name(&self) -> &'static str {
        "PluginRegistry"
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

pub type SharedPluginRegistry = Arc<PluginRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::model::Language;
    use crate::plugin::model::PluginMetadata;
    use std::path::PathBuf;

    fn sample_plugin() -> Plugin {
        Plugin::new(
            PluginMetadata {
                name: "Greeter".to_string(),
                version: "1.0.0".to_string(),
                description: String::new(),
                language: Language::Compiled,
            },
            PathBuf::from("hello.ext"),
            PathBuf::from("/plugins/greeter"),
            "deadbeef".to_string(),
        )
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = PluginRegistry::new();
        let plugin = sample_plugin();
        let id = registry.register(plugin).await;
        let fetched = registry.get(id).await.unwrap();
        assert_eq!(fetched.metadata.name, "Greeter");
    }

    #[tokio::test]
    async fn update_mutates_in_place() {
        let registry = PluginRegistry::new();
        let id = registry.register(sample_plugin()).await;
        registry.update(id, |p| p.mark_available()).await;
        let fetched = registry.get(id).await.unwrap();
        assert!(fetched.is_available());
    }

    #[tokio::test]
    async fn find_by_name_filters_correctly() {
        let registry = PluginRegistry::new();
        registry.register(sample_plugin()).await;
        let mut other = sample_plugin();
        other.metadata.name = "Other".to_string();
        registry.register(other).await;

        let found = registry.find_by_name("Greeter").await;
        assert_eq!(found.len(), 1);
    }
}
