//! Errors raised by manifest parsing, plugin validation and the plugin registry.
use std::path::PathBuf;

use thiserror::Error as ThisError;

use crate::plugin::dependency::DependencyError;

#[derive(Debug, ThisError)]
pub enum PluginSystemError {
    #[error("manifest at '{path}' failed to parse: {message}")]
    ManifestParse { path: PathBuf, message: String },

    #[error("plugin '{plugin_id}' failed validation: {message}")]
    Validation { plugin_id: String, message: String },

    #[error("plugin '{plugin_id}' entry point '{entry_point}' does not exist under its root")]
    MissingEntryPoint {
        plugin_id: String,
        entry_point: PathBuf,
    },

    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("dependency resolution failed for plugin '{plugin_id}': {source}")]
    DependencyResolution {
        plugin_id: String,
        #[source]
        source: DependencyError,
    },

    #[error("registration error for '{plugin_id}': {message}")]
    RegistrationError { plugin_id: String, message: String },

    #[error("failed to hash source tree at '{path}': {message}")]
    HashingFailed { path: PathBuf, message: String },

    #[error("internal plugin system error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, PluginSystemError>;
