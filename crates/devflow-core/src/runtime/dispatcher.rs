//! Factory (one singleton per language) and Composite (public facade) for the
//! runtime managers, generalizing the host's own per-component initialize loop
//! to a concurrent fan-out across runtimes.
use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::execution::{ExecutionContext, ExecutionResult};
use crate::plugin::{Language, Plugin};
use crate::resolver::ResolvedDependencyContext;
use crate::runtime::error::{Result, RuntimeSystemError};
use crate::runtime::{PluginCapabilities, RuntimeManager};
use crate::security::SecurityPolicy;

/// Holds one singleton runtime manager per language.
pub struct RuntimeFactory {
    managers: HashMap<Language, Arc<dyn RuntimeManager>>,
}

impl RuntimeFactory {
    pub fn new(managers: Vec<Arc<dyn RuntimeManager>>) -> Self {
        Self {
            managers: managers.into_iter().map(|m| (m.language(), m)).collect(),
        }
    }

    pub fn all_managers(&self) -> Vec<Arc<dyn RuntimeManager>> {
        self.managers.values().cloned().collect()
    }

    pub fn get_for_language(&self, language: Language) -> Option<Arc<dyn RuntimeManager>> {
        self.managers.get(&language).cloned()
    }

    /// First manager whose `can_execute` is true for this plugin.
    pub fn get_for_plugin(&self, plugin: &Plugin) -> Option<Arc<dyn RuntimeManager>> {
        self.managers.values().find(|m| m.can_execute(plugin)).cloned()
    }

    pub fn is_language_supported(&self, language: Language) -> bool {
        self.managers.contains_key(&language)
    }

    pub fn get_by_id(&self, runtime_id: &str) -> Option<Arc<dyn RuntimeManager>> {
        self.managers.values().find(|m| m.runtime_id() == runtime_id).cloned()
    }
}

/// Public runtime-manager facade used by the execution service.
pub struct CompositeDispatcher {
    factory: RuntimeFactory,
}

impl CompositeDispatcher {
    pub fn new(factory: RuntimeFactory) -> Self {
        Self { factory }
    }

    /// Initializes every manager concurrently. A manager that fails its own
    /// probe is left `is_available() == false`; the composite itself always
    /// succeeds so that a fleet-wide outage of one toolchain never blocks startup.
    pub async fn initialize(&self) -> Result<()> {
        let managers = self.factory.all_managers();
        let results = join_all(managers.iter().map(|m| m.initialize())).await;
        for (manager, result) in managers.iter().zip(results) {
            if let Err(err) = result {
                log::warn!("runtime '{}' failed its initialize probe: {err}", manager.runtime_id());
            }
        }
        Ok(())
    }

    pub async fn execute(
        &self,
        plugin: &Plugin,
        context: &ExecutionContext,
        resolved: &ResolvedDependencyContext,
        policy: &SecurityPolicy,
    ) -> Result<ExecutionResult> {
        let manager = self
            .factory
            .get_for_language(plugin.metadata.language)
            .ok_or(RuntimeSystemError::UnsupportedLanguage(plugin.metadata.language))?;
        if !manager.is_available() {
            return Err(RuntimeSystemError::RuntimeUnavailable(plugin.metadata.language));
        }
        manager.execute(plugin, context, resolved, policy).await
    }

    pub async fn validate(&self, plugin: &Plugin) -> Result<PluginCapabilities> {
        let manager = self
            .factory
            .get_for_language(plugin.metadata.language)
            .ok_or(RuntimeSystemError::UnsupportedLanguage(plugin.metadata.language))?;
        manager.validate(plugin).await
    }

    pub async fn dispose(&self) -> Result<()> {
        for manager in self.factory.all_managers() {
            manager.dispose().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct StubManager {
        language: Language,
        available: AtomicBool,
    }

    #[async_trait]
    impl RuntimeManager for StubManager {
        fn language(&self) -> Language {
            self.language
        }
        fn runtime_id(&self) -> &'static str {
            "stub"
        }
        async fn initialize(&self) -> Result<()> {
            self.available.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }
        async fn validate(&self, _plugin: &Plugin) -> Result<PluginCapabilities> {
            Ok(PluginCapabilities {
                executable: true,
                language: self.language,
                runtime_id: "stub",
                required_capabilities: Vec::new(),
                estimated_memory_cap_bytes: 1,
                estimated_timeout: Duration::from_secs(1),
                supports_cancellation: false,
                reasons: Vec::new(),
            })
        }
        async fn execute(
            &self,
            _plugin: &Plugin,
            _context: &ExecutionContext,
            _resolved: &ResolvedDependencyContext,
            _policy: &SecurityPolicy,
        ) -> Result<ExecutionResult> {
            unreachable!("not exercised in these tests")
        }
        async fn dispose(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unsupported_language_is_distinguished_from_unavailable_runtime() {
        let factory = RuntimeFactory::new(vec![Arc::new(StubManager {
            language: Language::Compiled,
            available: AtomicBool::new(false),
        })]);
        let dispatcher = CompositeDispatcher::new(factory);
        dispatcher.initialize().await.unwrap();

        assert!(dispatcher.factory.is_language_supported(Language::Compiled));
        assert!(!dispatcher.factory.is_language_supported(Language::Interpreted));
        assert!(dispatcher.factory.get_for_language(Language::Compiled).unwrap().is_available());
    }
}
