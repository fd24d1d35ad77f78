/// Engine name, used in log lines and scratch/cache path prefixes.
pub const APP_NAME: &str = "devflow";

/// Engine version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the manifest file expected at the root of every plugin.
pub const MANIFEST_FILE_NAME: &str = "plugin.json";

/// Marker file whose presence (alongside the expected artifact layout) indicates
/// an intact, durable cache entry or prepared environment.
pub const LOCK_MARKER_FILE_NAME: &str = ".devflow.lock";

/// Subdirectory of the cache root holding resolved ecosystem packages.
pub const CACHE_DEPENDENCIES_DIR: &str = "dependencies";

/// Subdirectory of the cache root holding compiled artifacts for the compiled/JIT runtime.
pub const CACHE_COMPILED_DIR: &str = "compiled-plugins";

/// Subdirectory of the cache root holding prepared per-plugin environments
/// (transpiled and interpreted runtimes).
pub const CACHE_ENVS_DIR: &str = "envs";

/// Default maximum number of concurrent plugin executions.
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 16;

/// Default execution timeout applied when an invocation does not specify one.
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 300;

/// Default memory cap applied when an invocation does not specify one.
pub const DEFAULT_MEMORY_CAP_BYTES: u64 = 256 * 1024 * 1024;

/// Environment variable names always forwarded into a filtered execution environment,
/// regardless of the configured allow-list.
pub const SAFE_SYSTEM_ENV_VARS: &[&str] = &["PATH", "TEMP", "TMP", "HOME", "USERPROFILE"];

/// Interval at which the resource monitor samples a running child's memory usage.
pub const MEMORY_POLL_INTERVAL_MS: u64 = 100;
