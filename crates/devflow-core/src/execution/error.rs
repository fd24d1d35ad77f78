use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("plugin '{0}' not found")]
    NotFound(String),

    #[error("plugin '{plugin_id}' failed validation: {message}")]
    ValidationFailed { plugin_id: String, message: String },

    #[error("plugin '{plugin_id}' has unresolved dependencies: {message}")]
    DependencyUnresolved { plugin_id: String, message: String },

    #[error("no runtime available for plugin '{plugin_id}': {message}")]
    RuntimeUnavailable { plugin_id: String, message: String },

    #[error("execution of plugin '{plugin_id}' failed: {message}")]
    ExecutionFailed { plugin_id: String, message: String },

    #[error("execution of plugin '{plugin_id}' was cancelled")]
    Cancelled { plugin_id: String },

    #[error("internal execution-service error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
