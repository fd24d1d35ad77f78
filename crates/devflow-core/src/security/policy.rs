//! Per-execution security policy and environment filtering.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kernel::constants::SAFE_SYSTEM_ENV_VARS;

#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    pub allowed_paths: HashSet<PathBuf>,
    pub network_permission: bool,
    pub allowed_env_vars: HashSet<String>,
    pub restricted_modules: HashSet<String>,
    pub wall_time_cap: Duration,
    pub memory_cap_bytes: u64,
    pub reflection_permission: bool,
    pub file_io_permission: bool,
    pub process_execution_permission: bool,
    pub registry_access_permission: bool,
}

impl SecurityPolicy {
    /// Builds a per-execution policy from global defaults plus the plugin's own
    /// root and scratch directory, always admitting those two paths plus the
    /// system temp directory.
    pub fn for_execution(
        plugin_root: &Path,
        scratch_dir: &Path,
        allowed_env_vars: HashSet<String>,
        wall_time_cap: Duration,
        memory_cap_bytes: u64,
    ) -> Self {
        let mut allowed_paths = HashSet::new();
        allowed_paths.insert(plugin_root.to_path_buf());
        allowed_paths.insert(scratch_dir.to_path_buf());
        allowed_paths.insert(std::env::temp_dir());

        Self {
            allowed_paths,
            network_permission: false,
            allowed_env_vars,
            restricted_modules: HashSet::new(),
            wall_time_cap,
            memory_cap_bytes,
            reflection_permission: false,
            file_io_permission: true,
            process_execution_permission: false,
            registry_access_permission: false,
        }
    }

    /// Filters `host_env` down to keys on `self.allowed_env_vars` (case-insensitive),
    /// always including the safe-system variables when present in the host.
    pub fn filter_environment<I>(&self, host_env: I) -> std::collections::HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let allowed_lower: HashSet<String> = self
            .allowed_env_vars
            .iter()
            .map(|s| s.to_ascii_uppercase())
            .chain(SAFE_SYSTEM_ENV_VARS.iter().map(|s| s.to_ascii_uppercase()))
            .collect();

        host_env
            .into_iter()
            .filter(|(k, _)| allowed_lower.contains(&k.to_ascii_uppercase()))
            .collect()
    }

    pub fn allows_path(&self, path: &Path) -> bool {
        self.allowed_paths.iter().any(|allowed| path.starts_with(allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_environment_keeps_allowed_and_safe_vars() {
        let mut allowed = HashSet::new();
        allowed.insert("MY_TOKEN".to_string());
        let policy = SecurityPolicy::for_execution(
            Path::new("/plugins/x"),
            Path::new("/tmp/scratch"),
            allowed,
            Duration::from_secs(300),
            256 * 1024 * 1024,
        );

        let host_env = vec![
            ("MY_TOKEN".to_string(), "secret".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("UNRELATED_SECRET".to_string(), "nope".to_string()),
        ];
        let filtered = policy.filter_environment(host_env);
        assert_eq!(filtered.get("MY_TOKEN"), Some(&"secret".to_string()));
        assert_eq!(filtered.get("PATH"), Some(&"/usr/bin".to_string()));
        assert!(!filtered.contains_key("UNRELATED_SECRET"));
    }

    #[test]
    fn allows_path_checks_plugin_root_and_scratch() {
        let policy = SecurityPolicy::for_execution(
            Path::new("/plugins/x"),
            Path::new("/tmp/scratch"),
            HashSet::new(),
            Duration::from_secs(300),
            256 * 1024 * 1024,
        );
        assert!(policy.allows_path(Path::new("/plugins/x/hello.ext")));
        assert!(!policy.allows_path(Path::new("/etc/passwd")));
    }
}
