use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::execution::ExecutionService;
use crate::kernel::component::{DependencyRegistry, KernelComponent};
use crate::kernel::constants;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::plugin::dependency::DependencyKind;
use crate::plugin::{DiscoveryService, PluginRegistry};
use crate::resolver::registry_client::{EcosystemRegistryClient, FakeRegistryClient};
use crate::resolver::DependencyResolver;
use crate::runtime::compiled::{CliCompilerToolchain, CompiledRuntimeManager};
use crate::runtime::interpreted::InterpretedRuntimeManager;
use crate::runtime::transpiled::TranspiledRuntimeManager;
use crate::runtime::{CompositeDispatcher, RuntimeFactory};
use crate::security::SecurityManager;
use crate::storage::{LocalStorageProvider, StorageProvider};
use crate::init_task::InitializationTask;

/// Coordinates every engine component via dependency injection, mirroring the
/// lifecycle shape the kernel's [`DependencyRegistry`] was built for: genuine
/// lifecycle components (the plugin registry, the security manager, the
/// startup discovery sweep) are driven uniformly through it, while the
/// stateless combinators (discovery, the resolver) and the dispatcher (which
/// has its own richer lifecycle) are held as concrete handles.
pub struct EngineHost {
    initialized: bool,
    started: bool,
    dependencies: Arc<Mutex<DependencyRegistry>>,
    component_init_order: Vec<TypeId>,

    storage: Arc<dyn StorageProvider>,
    discovery: Arc<DiscoveryService>,
    registry: Arc<PluginRegistry>,
    resolver: Arc<DependencyResolver>,
    security: Arc<SecurityManager>,
    dispatcher: Arc<CompositeDispatcher>,
    execution: Arc<ExecutionService>,
}

impl EngineHost {
    /// Assembles every component from `config` but performs no I/O probing yet;
    /// that happens in [`initialize`](Self::initialize).
    pub fn new(config: EngineConfig) -> Result<Self> {
        log::info!("assembling {} v{}", constants::APP_NAME, constants::APP_VERSION);

        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let discovery = Arc::new(DiscoveryService::new(storage.clone()));
        let registry = Arc::new(PluginRegistry::new());

        let mut registry_clients: HashMap<DependencyKind, Arc<dyn EcosystemRegistryClient>> = HashMap::new();
        for kind in [
            DependencyKind::EcosystemPackageA,
            DependencyKind::EcosystemPackageB,
            DependencyKind::EcosystemPackageC,
        ] {
            registry_clients.insert(kind, Arc::new(FakeRegistryClient::new()));
        }
        let resolver = Arc::new(DependencyResolver::new(
            config.cache_root.join(constants::CACHE_DEPENDENCIES_DIR),
            storage.clone(),
            registry_clients,
            registry.clone(),
        ));

        let security = Arc::new(SecurityManager::new(config.vulnerable_packages.clone()));

        let compiler = Arc::new(CliCompilerToolchain::new(
            config
                .toolchains
                .compiled_compiler_bin
                .clone()
                .unwrap_or_else(|| "rustc".to_string()),
            Vec::new(),
        ));
        let compiled_runtime = Arc::new(CompiledRuntimeManager::new(
            compiler,
            config.cache_root.join(constants::CACHE_COMPILED_DIR),
        ));
        let transpiled_runtime = Arc::new(TranspiledRuntimeManager::new(
            config
                .toolchains
                .transpiled_interpreter_bin
                .clone()
                .unwrap_or_else(|| "node".to_string()),
            config
                .toolchains
                .transpiled_package_manager_bin
                .clone()
                .unwrap_or_else(|| "npm".to_string()),
            config.cache_root.join(constants::CACHE_ENVS_DIR).join("transpiled"),
        ));
        let interpreted_runtime = Arc::new(InterpretedRuntimeManager::new(
            config.cache_root.join(constants::CACHE_ENVS_DIR).join("interpreted"),
        ));

        let factory = RuntimeFactory::new(vec![compiled_runtime, transpiled_runtime, interpreted_runtime]);
        let dispatcher = Arc::new(CompositeDispatcher::new(factory));

        let execution = Arc::new(ExecutionService::new(
            registry.clone(),
            discovery.clone(),
            resolver.clone(),
            security.clone(),
            dispatcher.clone(),
            storage.clone(),
        ));

        let init_task = Arc::new(InitializationTask::new(
            discovery.clone(),
            registry.clone(),
            config.discovery_roots.clone(),
        ));

        let mut dependency_registry = DependencyRegistry::new();
        let mut init_order = Vec::new();
        dependency_registry.register_instance(registry.clone());
        init_order.push(TypeId::of::<PluginRegistry>());
        dependency_registry.register_instance(security.clone());
        init_order.push(TypeId::of::<SecurityManager>());
        dependency_registry.register_instance(init_task);
        init_order.push(TypeId::of::<InitializationTask>());

        Ok(Self {
            initialized: false,
            started: false,
            dependencies: Arc::new(Mutex::new(dependency_registry)),
            component_init_order: init_order,
            storage,
            discovery,
            registry,
            resolver,
            security,
            dispatcher,
            execution,
        })
    }

    /// Convenience path used by binaries: assembles the host from a TOML
    /// configuration file (or engine defaults if the file is absent), then
    /// runs [`initialize`](Self::initialize) and [`start`](Self::start).
    #[cfg(feature = "toml-config")]
    pub async fn bootstrap(config_path: &std::path::Path) -> Result<Self> {
        let config = EngineConfig::load_from_file(config_path)
            .await
            .map_err(|e| Error::Other(e.to_string()))?;
        let mut host = Self::new(config)?;
        host.initialize().await?;
        host.start().await?;
        Ok(host)
    }

    pub async fn get_component<T: KernelComponent + 'static>(&self) -> Option<Arc<T>> {
        self.dependencies.lock().await.get_concrete::<T>()
    }

    pub fn execution_service(&self) -> Arc<ExecutionService> {
        self.execution.clone()
    }

    pub fn plugin_registry(&self) -> Arc<PluginRegistry> {
        self.registry.clone()
    }

    pub fn dispatcher(&self) -> Arc<CompositeDispatcher> {
        self.dispatcher.clone()
    }

    pub fn discovery(&self) -> Arc<DiscoveryService> {
        self.discovery.clone()
    }

    pub fn resolver(&self) -> Arc<DependencyResolver> {
        self.resolver.clone()
    }

    pub fn storage(&self) -> Arc<dyn StorageProvider> {
        self.storage.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Initializes every registered lifecycle component, then probes every
    /// runtime manager's toolchain concurrently.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::Initialize,
                component_name: None,
                message: "engine host already initialized".to_string(),
                source: None,
            });
        }
        log::info!("initializing components...");
        {
            let registry = self.dependencies.lock().await;
            for type_id in &self.component_init_order {
                let component = registry.get_component_by_id(type_id).ok_or_else(|| Error::ComponentRegistryError {
                    operation: "initialize".to_string(),
                    component_name: None,
                    message: "instance missing from registry".to_string(),
                })?;
                log::info!("initializing component: {}", component.name());
                component.initialize().await?;
            }
        }

        self.dispatcher.initialize().await.map_err(|e| Error::KernelLifecycleError {
            phase: KernelLifecyclePhase::Initialize,
            component_name: Some("runtime-dispatcher".to_string()),
            message: e.to_string(),
            source: None,
        })?;

        self.initialized = true;
        log::info!("component initialization complete");
        Ok(())
    }

    /// Starts every registered lifecycle component in order, which fires the
    /// one-shot startup discovery sweep.
    pub async fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::Start,
                component_name: None,
                message: "engine host must be initialized before starting".to_string(),
                source: None,
            });
        }
        log::info!("starting components...");
        {
            let registry = self.dependencies.lock().await;
            for type_id in &self.component_init_order {
                let component = registry.get_component_by_id(type_id).ok_or_else(|| Error::ComponentRegistryError {
                    operation: "start".to_string(),
                    component_name: None,
                    message: "instance missing from registry".to_string(),
                })?;
                log::info!("starting component: {}", component.name());
                component.start().await?;
            }
        }
        self.started = true;
        log::info!("component start complete");
        Ok(())
    }

    /// Stops every registered lifecycle component in reverse order, then
    /// disposes every runtime manager. Errors are logged but shutdown always
    /// runs to completion across every component.
    pub async fn shutdown(&mut self) -> Result<()> {
        log::info!("shutting down components...");
        let registry = self.dependencies.lock().await;
        let mut first_error = None;
        for type_id in self.component_init_order.iter().rev() {
            if let Some(component) = registry.get_component_by_id(type_id) {
                log::info!("stopping component: {}", component.name());
                if let Err(e) = component.stop().await {
                    log::error!("error stopping component {}: {e}", component.name());
                    if first_error.is_none() {
                        first_error = Some((component.name(), e));
                    }
                }
            }
        }
        drop(registry);

        if let Err(e) = self.dispatcher.dispose().await {
            log::error!("error disposing runtime dispatcher: {e}");
        }

        self.started = false;
        self.initialized = false;
        log::info!("component shutdown complete");

        if let Some((name, source)) = first_error {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::Shutdown,
                component_name: Some(name.to_string()),
                message: "component failed to stop".to_string(),
                source: Some(Box::new(source)),
            });
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_runs_initialize_then_start_then_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.cache_root = tmp.path().to_path_buf();
        config.discovery_roots = vec![tmp.path().to_path_buf()];

        let mut host = EngineHost::new(config).unwrap();
        assert!(!host.is_initialized());

        host.initialize().await.unwrap();
        assert!(host.is_initialized());

        host.start().await.unwrap();
        assert!(host.is_started());

        host.shutdown().await.unwrap();
        assert!(!host.is_started());
    }

    #[tokio::test]
    async fn double_initialize_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.cache_root = tmp.path().to_path_buf();

        let mut host = EngineHost::new(config).unwrap();
        host.initialize().await.unwrap();
        assert!(host.initialize().await.is_err());
    }
}
