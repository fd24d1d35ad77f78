use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeSystemError {
    #[error("no runtime manager registered for language {0:?}")]
    UnsupportedLanguage(crate::plugin::Language),

    #[error("runtime for language {0:?} failed its initialize probe and is unavailable")]
    RuntimeUnavailable(crate::plugin::Language),

    #[error("toolchain '{name}' was not found on PATH")]
    ToolchainNotFound { name: String },

    #[error("compilation of plugin '{plugin_id}' failed (exit {exit_code:?}): {stderr}")]
    CompilationFailed {
        plugin_id: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to load compiled artifact at '{path}': {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("no entry point matching the plugin contract was found in '{path}'")]
    NoEntryPointFound { path: PathBuf },

    #[error("execution of plugin '{plugin_id}' failed: {message}")]
    ExecutionFailed { plugin_id: String, message: String },

    #[error("execution of plugin '{plugin_id}' was cancelled")]
    Cancelled { plugin_id: String },

    #[error("failed to prepare environment for plugin '{plugin_id}': {message}")]
    EnvironmentPreparationFailed { plugin_id: String, message: String },

    #[error("io error during '{operation}' at '{path}': {source}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RuntimeSystemError>;
