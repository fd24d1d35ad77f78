//! Engine configuration: discovery roots, cache layout, execution defaults and
//! per-language toolchain overrides, loaded from TOML with defaults sane enough
//! to boot on an empty file.
use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::kernel::constants;

/// Per-language CLI toolchain override, applied on top of the built-in defaults
/// (`rustc`-style compiler binary, `node`/`npm`, `python3`/`pip`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolchainOverride {
    pub compiled_compiler_bin: Option<String>,
    pub transpiled_interpreter_bin: Option<String>,
    pub transpiled_package_manager_bin: Option<String>,
    pub interpreted_interpreter_bin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Filesystem roots walked by discovery at startup.
    pub discovery_roots: Vec<PathBuf>,
    /// Root directory for the dependency cache and per-runtime environment caches.
    pub cache_root: PathBuf,
    /// Default execution timeout, seconds, applied when an invocation does not specify one.
    pub default_execution_timeout_secs: u64,
    /// Default memory cap, bytes, applied when an invocation does not specify one.
    pub default_memory_cap_bytes: u64,
    /// Environment variable names forwarded into a plugin's filtered environment in
    /// addition to the engine's always-safe set.
    pub environment_allow_list: HashSet<String>,
    /// Maximum number of plugin executions allowed to run concurrently.
    pub max_concurrent_executions: usize,
    /// Package names administratively flagged as vulnerable, folded into every
    /// risk assessment regardless of what a manifest declares.
    pub vulnerable_packages: HashSet<String>,
    /// Per-language toolchain binary overrides.
    pub toolchains: ToolchainOverride,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_roots: Vec::new(),
            cache_root: PathBuf::from(".devflow-cache"),
            default_execution_timeout_secs: constants::DEFAULT_EXECUTION_TIMEOUT_SECS,
            default_memory_cap_bytes: constants::DEFAULT_MEMORY_CAP_BYTES,
            environment_allow_list: HashSet::new(),
            max_concurrent_executions: constants::DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            vulnerable_packages: HashSet::new(),
            toolchains: ToolchainOverride::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document, falling back to [`EngineConfig::default`] for every
    /// field the document omits.
    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    #[cfg(feature = "toml-config")]
    pub async fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse engine configuration: {0}")]
    Parse(String),
    #[error("failed to read engine configuration file: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let config = EngineConfig::default();
        assert!(config.default_execution_timeout_secs > 0);
        assert!(config.default_memory_cap_bytes > 0);
        assert!(config.max_concurrent_executions > 0);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn empty_document_parses_to_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache_root, EngineConfig::default().cache_root);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            cache_root = "/var/lib/devflow/cache"
            max_concurrent_executions = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/var/lib/devflow/cache"));
        assert_eq!(config.max_concurrent_executions, 4);
        assert_eq!(
            config.default_execution_timeout_secs,
            EngineConfig::default().default_execution_timeout_secs
        );
    }
}
