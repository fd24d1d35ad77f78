use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use async_trait::async_trait;
use crate::kernel::error::Result;

/// Lifecycle trait implemented by every component the [`EngineHost`](super::bootstrap::EngineHost)
/// drives uniformly: the plugin registry, the security manager, and the one-shot
/// startup discovery task. The runtime dispatcher has a richer init/dispose shape
/// of its own and is held as a concrete handle instead of going through here.
#[async_trait]
pub trait KernelComponent: Any + Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn initialize(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Component map keyed by the concrete type's `TypeId`. `EngineHost` tracks its own
/// `component_init_order: Vec<TypeId>` alongside this map (a `HashMap` has no
/// defined iteration order, and component startup order matters: the plugin
/// registry and security manager must exist before the discovery task that
/// registers plugins into them runs) and looks components up here by id during
/// each lifecycle pass, or by concrete type when a caller needs the real type
/// back out.
#[derive(Default, Debug)]
pub struct DependencyRegistry {
    instances: HashMap<TypeId, Arc<dyn KernelComponent>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Register a component instance, keyed by the `TypeId` of its concrete type `V`.
    pub fn register_instance<V>(&mut self, instance: Arc<V>)
    where
        V: KernelComponent + 'static,
    {
        let type_id = TypeId::of::<V>();
        self.instances.insert(type_id, instance);
    }

    pub fn get_component_by_id(&self, type_id: &TypeId) -> Option<Arc<dyn KernelComponent>> {
        self.instances.get(type_id).cloned()
    }

    /// Fetch a component back out as its concrete type `T`, for callers (e.g. host
    /// consumers reaching for the `PluginRegistry` directly) that need more than
    /// the `KernelComponent` trait surface exposes.
    pub fn get_concrete<T: KernelComponent + 'static>(&self) -> Option<Arc<T>> {
        let type_id = TypeId::of::<T>();
        self.instances.get(&type_id).and_then(|arc_kc| {
            let cloned_arc = arc_kc.clone();
            let arc_any: Arc<dyn Any + Send + Sync> = cloned_arc;
            Arc::downcast::<T>(arc_any).ok()
        })
    }
}
