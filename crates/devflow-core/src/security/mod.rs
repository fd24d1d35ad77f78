//! Security manager: per-execution policy, environment filtering, resource
//! monitoring and static risk assessment, tied together behind an active
//! context map.
pub mod error;
pub mod monitor;
pub mod policy;
pub mod risk;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::kernel::component::KernelComponent;
use crate::kernel::error::Result as KernelResult;

pub use error::{Result, SecuritySystemError};
pub use monitor::MonitorOutcome;
pub use policy::SecurityPolicy;
pub use risk::{Risk, RiskAssessor, Severity, TrustLevel};

/// A live security context for one in-flight execution: its policy, scratch
/// directory and filtered environment, populated with monitoring results once
/// the execution finishes.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub id: String,
    pub policy: SecurityPolicy,
    pub scratch_dir: PathBuf,
    pub filtered_env: HashMap<String, String>,
    pub peak_memory_bytes: Option<u64>,
    pub duration: Option<Duration>,
}

pub struct SecurityManager {
    vulnerable_packages: HashSet<String>,
    active: Mutex<HashMap<String, SecurityContext>>,
}

impl std::fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityManager").finish_non_exhaustive()
    }
}

impl SecurityManager {
    pub fn new(vulnerable_packages: HashSet<String>) -> Self {
        Self {
            vulnerable_packages,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn risk_assessor(&self) -> RiskAssessor {
        RiskAssessor::new(self.vulnerable_packages.clone())
    }

    /// Opens a new security context for an execution, seeding its environment
    /// and path allow-list from `plugin_root`/`scratch_dir`.
    pub async fn open_context(
        &self,
        plugin_root: &Path,
        scratch_dir: &Path,
        allowed_env_vars: HashSet<String>,
        wall_time_cap: Duration,
        memory_cap_bytes: u64,
        host_env: impl IntoIterator<Item = (String, String)>,
    ) -> SecurityContext {
        let policy = SecurityPolicy::for_execution(
            plugin_root,
            scratch_dir,
            allowed_env_vars,
            wall_time_cap,
            memory_cap_bytes,
        );
        let filtered_env = policy.filter_environment(host_env);
        let context = SecurityContext {
            id: Uuid::new_v4().to_string(),
            policy,
            scratch_dir: scratch_dir.to_path_buf(),
            filtered_env,
            peak_memory_bytes: None,
            duration: None,
        };
        self.active.lock().await.insert(context.id.clone(), context.clone());
        context
    }

    pub async fn record_outcome(&self, context_id: &str, outcome: MonitorOutcome) -> Result<()> {
        let mut active = self.active.lock().await;
        let context = active
            .get_mut(context_id)
            .ok_or_else(|| SecuritySystemError::ContextNotFound(context_id.to_string()))?;
        context.peak_memory_bytes = Some(outcome.peak_memory_bytes);
        context.duration = Some(outcome.duration);
        Ok(())
    }

    pub async fn context(&self, context_id: &str) -> Option<SecurityContext> {
        self.active.lock().await.get(context_id).cloned()
    }

    /// Removes the context from the active map. Physical deletion of its scratch
    /// directory is the execution service's job (`execution::scratch::cleanup`),
    /// which applies the short post-execution delay; releasing a context here
    /// does not touch the filesystem at all.
    pub async fn release(&self, context_id: &str) {
        self.active.lock().await.remove(context_id);
    }
}

#[async_trait]
impl KernelComponent for SecurityManager {
    fn name(&self) -> &'static str {
        "security-manager"
    }

    async fn initialize(&self) -> KernelResult<()> {
        Ok(())
    }

    async fn start(&self) -> KernelResult<()> {
        Ok(())
    }

    async fn stop(&self) -> KernelResult<()> {
        let mut active = self.active.lock().await;
        for (id, context) in active.drain() {
            if let Err(err) = tokio::fs::remove_dir_all(&context.scratch_dir).await {
                log::warn!("failed to remove scratch directory for context '{id}' during shutdown: {err}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_context_then_release_clears_map() {
        let manager = SecurityManager::new(HashSet::new());
        let dir = tempfile::tempdir().unwrap();
        let context = manager
            .open_context(
                dir.path(),
                dir.path(),
                HashSet::new(),
                Duration::from_secs(5),
                1024,
                std::iter::empty(),
            )
            .await;
        assert!(manager.context(&context.id).await.is_some());
        manager.release(&context.id).await;
        assert!(manager.context(&context.id).await.is_none());
    }

    #[tokio::test]
    async fn record_outcome_requires_known_context() {
        let manager = SecurityManager::new(HashSet::new());
        let outcome = MonitorOutcome { peak_memory_bytes: 10, duration: Duration::from_secs(1) };
        let result = manager.record_outcome("missing", outcome).await;
        assert!(matches!(result, Err(SecuritySystemError::ContextNotFound(_))));
    }
}
