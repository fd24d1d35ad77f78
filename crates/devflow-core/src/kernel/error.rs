//! Crate-wide error type.
//!
//! Every subsystem (plugin discovery/registry, dependency resolution, security,
//! runtime dispatch, execution, storage) defines its own `thiserror`-derived error
//! enum; this module aggregates them behind a single [`Error`] via `#[from]`, so
//! callers crossing a subsystem boundary can use `?` without manual wrapping.
use std::path::PathBuf;
use thiserror::Error as ThisError;

use crate::execution::error::ExecutionError;
use crate::plugin::error::PluginSystemError;
use crate::resolver::error::ResolverError;
use crate::runtime::error::RuntimeSystemError;
use crate::security::error::SecuritySystemError;
use crate::storage::error::StorageSystemError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    #[error("dependency resolution error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("security error: {0}")]
    Security(#[from] SecuritySystemError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeSystemError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("storage error: {0}")]
    StorageSystem(#[from] StorageSystemError),

    /// Error occurring during a specific kernel lifecycle phase (component init/start/stop).
    #[error("kernel lifecycle error during {phase:?}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        component_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Failure looking up or registering a component in the [`DependencyRegistry`](super::component::DependencyRegistry).
    #[error("component registry error during operation '{operation}': {message}")]
    ComponentRegistryError {
        operation: String,
        component_name: Option<String>,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

/// A phase in the [`EngineHost`](super::bootstrap::EngineHost) lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("bootstrap")]
    Bootstrap,
    #[error("initialize")]
    Initialize,
    #[error("start")]
    Start,
    #[error("shutdown")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<std::io::Error> for Error {
    fn from(io_err: std::io::Error) -> Self {
        Error::StorageSystem(StorageSystemError::Io {
            source: io_err,
            path: PathBuf::new(),
            operation: "unknown".to_string(),
        })
    }
}

impl Error {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: PathBuf) -> Self {
        Error::StorageSystem(StorageSystemError::Io {
            source,
            operation: operation.into(),
            path,
        })
    }
}
