//! Execution Service: end-to-end plugin invocation orchestration.
pub mod context;
pub mod error;
pub mod scratch;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::plugin::{DiscoveryService, Plugin, PluginId, PluginRegistry, PluginStatus};
use crate::resolver::{DependencyResolver, ResolvedDependencyContext};
use crate::runtime::{CompositeDispatcher, PluginCapabilities};
use crate::security::SecurityManager;
use crate::storage::StorageProvider;

pub use context::{ExecutionContext, ExecutionResult};
pub use error::{ExecutionError, Result};

pub struct ExecutionService {
    registry: Arc<PluginRegistry>,
    discovery: Arc<DiscoveryService>,
    resolver: Arc<DependencyResolver>,
    security: Arc<SecurityManager>,
    dispatcher: Arc<CompositeDispatcher>,
    storage: Arc<dyn StorageProvider>,
}

impl ExecutionService {
    pub fn new(
        registry: Arc<PluginRegistry>,
        discovery: Arc<DiscoveryService>,
        resolver: Arc<DependencyResolver>,
        security: Arc<SecurityManager>,
        dispatcher: Arc<CompositeDispatcher>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        Self {
            registry,
            discovery,
            resolver,
            security,
            dispatcher,
            storage,
        }
    }

    /// End-to-end invocation: lookup, re-validate-if-dirty, scratch dir, execute, cleanup.
    pub async fn execute(
        &self,
        plugin_id: PluginId,
        input: Value,
        parameters: HashMap<String, Value>,
        correlation: String,
    ) -> Result<ExecutionResult> {
        let mut plugin = self
            .registry
            .get(plugin_id)
            .await
            .ok_or_else(|| ExecutionError::NotFound(plugin_id.to_string()))?;

        self.revalidate_if_dirty(&mut plugin).await?;

        if !plugin.is_available() {
            return Err(ExecutionError::ValidationFailed {
                plugin_id: plugin_id.to_string(),
                message: plugin
                    .last_error
                    .clone()
                    .unwrap_or_else(|| format!("plugin is not available (status: {:?})", plugin.status)),
            });
        }

        let resolved = self.resolver.resolve_plugin(&plugin).await.map_err(|e| {
            ExecutionError::DependencyUnresolved {
                plugin_id: plugin_id.to_string(),
                message: e.to_string(),
            }
        })?;

        let scratch_dir = scratch::create(&self.storage, &plugin.metadata.name)
            .map_err(|e| ExecutionError::Internal(e.to_string()))?;

        let result = self.execute_in_scratch(&plugin, input, parameters, correlation, &resolved, &scratch_dir).await;

        scratch::cleanup(&self.storage, &scratch_dir).await;

        let result = result?;
        self.registry
            .update(plugin_id, |p| p.record_execution(chrono::Utc::now()))
            .await;
        Ok(result)
    }

    async fn execute_in_scratch(
        &self,
        plugin: &Plugin,
        input: Value,
        parameters: HashMap<String, Value>,
        correlation: String,
        resolved: &ResolvedDependencyContext,
        scratch_dir: &std::path::Path,
    ) -> Result<ExecutionResult> {
        let security_context = self
            .security
            .open_context(
                &plugin.root,
                scratch_dir,
                crate::kernel::constants::SAFE_SYSTEM_ENV_VARS.iter().map(|s| s.to_string()).collect(),
                std::time::Duration::from_secs(crate::kernel::constants::DEFAULT_EXECUTION_TIMEOUT_SECS),
                crate::kernel::constants::DEFAULT_MEMORY_CAP_BYTES,
                std::env::vars(),
            )
            .await;

        let context = ExecutionContext::new(scratch_dir.to_path_buf(), input, correlation)
            .with_parameters(parameters)
            .with_environment(security_context.filtered_env.clone())
            .with_timeout(security_context.policy.wall_time_cap)
            .with_memory_cap_bytes(security_context.policy.memory_cap_bytes);

        let outcome = self
            .dispatcher
            .execute(plugin, &context, resolved, &security_context.policy)
            .await;

        self.security.release(&security_context.id).await;

        outcome.map_err(|e| ExecutionError::ExecutionFailed {
            plugin_id: plugin.id.to_string(),
            message: e.to_string(),
        })
    }

    /// Re-hashes `plugin` and, if `revalidate` touched it (hash changed, or it
    /// was re-checked out of `Error`), persists the updated status/hash back
    /// into the registry before the caller inspects availability.
    async fn revalidate_if_dirty(&self, plugin: &mut Plugin) -> Result<()> {
        let was_available = plugin.is_available();
        let drifted = self
            .discovery
            .revalidate(plugin)
            .map_err(|e| ExecutionError::Internal(e.to_string()))?;
        if drifted || !was_available {
            let (status, last_error, source_hash) =
                (plugin.status, plugin.last_error.clone(), plugin.source_hash.clone());
            self.registry
                .update(plugin.id, |p| {
                    p.status = status;
                    p.last_error = last_error;
                    p.source_hash = source_hash;
                })
                .await;
        }
        Ok(())
    }

    pub async fn get_plugin_capabilities(&self, plugin_id: PluginId) -> Result<PluginCapabilities> {
        let plugin = self
            .registry
            .get(plugin_id)
            .await
            .ok_or_else(|| ExecutionError::NotFound(plugin_id.to_string()))?;
        if plugin.status == PluginStatus::Disabled {
            return Ok(PluginCapabilities {
                executable: false,
                language: plugin.metadata.language,
                runtime_id: "none",
                required_capabilities: plugin.capabilities.clone(),
                estimated_memory_cap_bytes: crate::kernel::constants::DEFAULT_MEMORY_CAP_BYTES,
                estimated_timeout: std::time::Duration::from_secs(crate::kernel::constants::DEFAULT_EXECUTION_TIMEOUT_SECS),
                supports_cancellation: false,
                reasons: vec!["plugin is administratively disabled".to_string()],
            });
        }
        self.dispatcher
            .validate(&plugin)
            .await
            .map_err(|e| ExecutionError::RuntimeUnavailable {
                plugin_id: plugin_id.to_string(),
                message: e.to_string(),
            })
    }
}
