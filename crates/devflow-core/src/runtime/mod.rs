//! Runtime managers: one per plugin language, each able to prepare an isolated
//! environment for a plugin and execute it under a security policy.
pub mod compiled;
pub mod dispatcher;
pub mod error;
pub mod interpreted;
pub mod transpiled;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::execution::{ExecutionContext, ExecutionResult};
use crate::plugin::{Language, Plugin};
use crate::resolver::ResolvedDependencyContext;
use crate::security::SecurityPolicy;

pub use dispatcher::{CompositeDispatcher, RuntimeFactory};
pub use error::{Result, RuntimeSystemError};

/// Describes whether a plugin can currently be executed, and if not, why.
#[derive(Debug, Clone)]
pub struct PluginCapabilities {
    pub executable: bool,
    pub language: Language,
    pub runtime_id: &'static str,
    pub required_capabilities: Vec<String>,
    pub estimated_memory_cap_bytes: u64,
    pub estimated_timeout: std::time::Duration,
    pub supports_cancellation: bool,
    pub reasons: Vec<String>,
}

/// A record of one compiled artifact, produced by the compiled runtime and
/// cached keyed on its compile cache key.
#[derive(Debug, Clone)]
pub struct CompiledArtifactRecord {
    pub plugin_id: String,
    pub artifact_path: PathBuf,
    pub cache_key: String,
    pub compiled_at: DateTime<Utc>,
}

/// Implemented once per language. Every method that can fail distinguishes a
/// runtime that is simply unavailable (failed its own `initialize` probe) from
/// one that does not exist for the plugin's language at all — that distinction
/// is made one level up, in the Composite.
#[async_trait]
pub trait RuntimeManager: Send + Sync {
    fn language(&self) -> Language;
    fn runtime_id(&self) -> &'static str;

    /// Probes the local toolchain. Must never panic and must never fail the
    /// calling process: a failed probe marks `is_available() == false` instead.
    async fn initialize(&self) -> Result<()>;

    fn is_available(&self) -> bool;

    fn can_execute(&self, plugin: &Plugin) -> bool {
        plugin.metadata.language == self.language() && self.is_available()
    }

    /// Checks whether `plugin` is presently executable by this manager and
    /// returns a capability description either way.
    async fn validate(&self, plugin: &Plugin) -> Result<PluginCapabilities>;

    async fn execute(
        &self,
        plugin: &Plugin,
        context: &ExecutionContext,
        resolved: &ResolvedDependencyContext,
        policy: &SecurityPolicy,
    ) -> Result<ExecutionResult>;

    async fn dispose(&self) -> Result<()>;
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
