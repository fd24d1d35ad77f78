//! Runtime-C: the compiled/JIT language runtime manager. Compiles plugin
//! sources via the language's CLI toolchain, then loads the produced shared
//! library through an FFI contract adapted from the host's own dynamic-plugin
//! loading machinery.
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as TokioMutex;

use crate::execution::{ExecutionContext, ExecutionResult};
use crate::plugin::{Language, Plugin};
use crate::resolver::ResolvedDependencyContext;
use crate::runtime::error::{Result, RuntimeSystemError};
use crate::runtime::{now, CompiledArtifactRecord, PluginCapabilities, RuntimeManager};
use crate::security::SecurityPolicy;

const RUNTIME_ID: &str = "runtime-compiled";
const STALE_ARTIFACT_AGE: Duration = Duration::from_secs(3600);

/// Abstracts the compiler CLI so tests can substitute a deterministic fake
/// instead of shelling out to a real toolchain (mirrors `EcosystemRegistryClient`).
#[async_trait]
pub trait CompilerToolchain: Send + Sync {
    async fn probe(&self) -> bool;
    /// Compiles `build_dir` (already populated with source + a project
    /// descriptor) and returns the produced artifact's bytes.
    async fn compile(&self, build_dir: &Path) -> std::result::Result<Vec<u8>, String>;
}

/// Shells out to a named CLI (e.g. `rustc`/`go build`-equivalent) on PATH.
pub struct CliCompilerToolchain {
    binary_name: String,
    build_args: Vec<String>,
}

impl CliCompilerToolchain {
    pub fn new(binary_name: impl Into<String>, build_args: Vec<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            build_args,
        }
    }
}

#[async_trait]
impl CompilerToolchain for CliCompilerToolchain {
    async fn probe(&self) -> bool {
        tokio::process::Command::new(&self.binary_name)
            .arg("--version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    async fn compile(&self, build_dir: &Path) -> std::result::Result<Vec<u8>, String> {
        let output = tokio::process::Command::new(&self.binary_name)
            .args(&self.build_args)
            .current_dir(build_dir)
            .output()
            .await
            .map_err(|e| e.to_string())?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).into_owned());
        }
        Ok(output.stdout)
    }
}

/// extern "C" signature the produced artifact must export under the symbol
/// `devflow_plugin_execute`: takes a NUL-terminated UTF-8 JSON payload and
/// returns an owned NUL-terminated UTF-8 JSON string, freed via
/// `devflow_plugin_free_result`.
type PluginExecuteFn = unsafe extern "C" fn(payload: *const c_char) -> *mut c_char;
type PluginFreeFn = unsafe extern "C" fn(ptr: *mut c_char);

struct LoadedArtifact {
    library: Library,
}

impl LoadedArtifact {
    fn load(path: &Path) -> std::result::Result<Self, String> {
        let library = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;
        Ok(Self { library })
    }

    /// Calls the exported entry point, isolating a panic inside the loaded
    /// code from unwinding into this process.
    fn call_execute(&self, payload_json: &str) -> std::result::Result<String, String> {
        let execute: Symbol<PluginExecuteFn> = unsafe {
            self.library
                .get(b"devflow_plugin_execute\0")
                .map_err(|e| format!("missing symbol devflow_plugin_execute: {e}"))?
        };
        let free: Symbol<PluginFreeFn> = unsafe {
            self.library
                .get(b"devflow_plugin_free_result\0")
                .map_err(|e| format!("missing symbol devflow_plugin_free_result: {e}"))?
        };
        let payload_c = CString::new(payload_json).map_err(|e| e.to_string())?;
        let execute_fn: PluginExecuteFn = *execute;
        let free_fn: PluginFreeFn = *free;

        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| unsafe {
            execute_fn(payload_c.as_ptr())
        }));

        match result {
            Ok(raw_ptr) if raw_ptr.is_null() => Err("plugin entry point returned a null result".to_string()),
            Ok(raw_ptr) => {
                let owned = unsafe { CStr::from_ptr(raw_ptr) }.to_string_lossy().into_owned();
                unsafe { free_fn(raw_ptr) };
                Ok(owned)
            }
            Err(panic_obj) => {
                let message = panic_obj
                    .downcast_ref::<&'static str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_obj.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic in loaded artifact".to_string());
                Err(format!("panic during execute: {message}"))
            }
        }
    }
}

pub struct CompiledRuntimeManager {
    toolchain: Arc<dyn CompilerToolchain>,
    cache_root: PathBuf,
    available: AtomicBool,
    compile_locks: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl CompiledRuntimeManager {
    pub fn new(toolchain: Arc<dyn CompilerToolchain>, cache_root: PathBuf) -> Self {
        Self {
            toolchain,
            cache_root,
            available: AtomicBool::new(false),
            compile_locks: TokioMutex::new(HashMap::new()),
        }
    }

    /// Hash of {pluginId, declared version, entry-point source hash}.
    pub fn cache_key(plugin: &Plugin) -> String {
        let mut hasher = Sha256::new();
        hasher.update(plugin.id.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(plugin.metadata.version.as_bytes());
        hasher.update(b"\0");
        hasher.update(plugin.source_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn artifact_path(&self, cache_key: &str) -> PathBuf {
        self.cache_root.join(format!("{cache_key}.devflowartifact"))
    }

    async fn lock_for(&self, cache_key: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.compile_locks.lock().await;
        locks
            .entry(cache_key.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    async fn ensure_compiled(
        &self,
        plugin: &Plugin,
        resolved: &ResolvedDependencyContext,
    ) -> Result<CompiledArtifactRecord> {
        let cache_key = Self::cache_key(plugin);
        let artifact_path = self.artifact_path(&cache_key);
        let lock = self.lock_for(&cache_key).await;
        let _guard = lock.lock().await;

        if artifact_path.exists() {
            return Ok(CompiledArtifactRecord {
                plugin_id: plugin.id.to_string(),
                artifact_path,
                cache_key,
                compiled_at: now(),
            });
        }

        let build_dir = tempfile::tempdir().map_err(|e| RuntimeSystemError::Io {
            operation: "create build dir".to_string(),
            path: self.cache_root.clone(),
            source: e,
        })?;
        copy_recursive(&plugin.root, build_dir.path()).map_err(|e| RuntimeSystemError::Io {
            operation: "copy plugin source".to_string(),
            path: plugin.root.clone(),
            source: e,
        })?;
        write_project_descriptor(build_dir.path(), plugin, resolved).map_err(|e| RuntimeSystemError::Io {
            operation: "write project descriptor".to_string(),
            path: build_dir.path().to_path_buf(),
            source: e,
        })?;

        let artifact_bytes = self
            .toolchain
            .compile(build_dir.path())
            .await
            .map_err(|stderr| RuntimeSystemError::CompilationFailed {
                plugin_id: plugin.id.to_string(),
                exit_code: None,
                stderr,
            })?;

        if let Some(parent) = artifact_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RuntimeSystemError::Io {
                operation: "create cache dir".to_string(),
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&artifact_path, &artifact_bytes).map_err(|e| RuntimeSystemError::Io {
            operation: "write artifact".to_string(),
            path: artifact_path.clone(),
            source: e,
        })?;

        Ok(CompiledArtifactRecord {
            plugin_id: plugin.id.to_string(),
            artifact_path,
            cache_key,
            compiled_at: now(),
        })
    }
}

fn write_project_descriptor(
    build_dir: &Path,
    plugin: &Plugin,
    resolved: &ResolvedDependencyContext,
) -> std::io::Result<()> {
    let descriptor = serde_json::json!({
        "name": plugin.metadata.name,
        "version": plugin.metadata.version,
        "entryPoint": plugin.entry_point,
        "packages": resolved.packages.iter().map(|p| serde_json::json!({
            "name": p.name,
            "version": p.version,
            "installPath": p.install_path,
        })).collect::<Vec<_>>(),
        "files": resolved.files.iter().map(|f| &f.path).collect::<Vec<_>>(),
    });
    std::fs::write(
        build_dir.join("devflow.project.json"),
        serde_json::to_vec_pretty(&descriptor)?,
    )
}

fn copy_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(&dest)?;
            copy_recursive(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Deletes cached artifacts older than [`STALE_ARTIFACT_AGE`].
fn clean_stale_artifacts(cache_root: &Path) {
    let Ok(entries) = std::fs::read_dir(cache_root) else {
        return;
    };
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else { continue };
        let Ok(age) = metadata.modified().and_then(|m| m.elapsed().map_err(std::io::Error::other)) else {
            continue;
        };
        if age > STALE_ARTIFACT_AGE {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

#[async_trait]
impl RuntimeManager for CompiledRuntimeManager {
    fn language(&self) -> Language {
        Language::Compiled
    }

    fn runtime_id(&self) -> &'static str {
        RUNTIME_ID
    }

    async fn initialize(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cache_root).map_err(|e| RuntimeSystemError::Io {
            operation: "create compiled-artifact cache root".to_string(),
            path: self.cache_root.clone(),
            source: e,
        })?;
        clean_stale_artifacts(&self.cache_root);
        self.available.store(self.toolchain.probe().await, Ordering::SeqCst);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn validate(&self, plugin: &Plugin) -> Result<PluginCapabilities> {
        let mut reasons = Vec::new();
        if !self.is_available() {
            reasons.push("compiler toolchain is not available on this host".to_string());
        }
        Ok(PluginCapabilities {
            executable: reasons.is_empty(),
            language: Language::Compiled,
            runtime_id: RUNTIME_ID,
            required_capabilities: plugin.capabilities.clone(),
            estimated_memory_cap_bytes: 256 * 1024 * 1024,
            estimated_timeout: Duration::from_secs(300),
            supports_cancellation: true,
            reasons,
        })
    }

    async fn execute(
        &self,
        plugin: &Plugin,
        context: &ExecutionContext,
        resolved: &ResolvedDependencyContext,
        _policy: &SecurityPolicy,
    ) -> Result<ExecutionResult> {
        if !self.is_available() {
            return Err(RuntimeSystemError::RuntimeUnavailable(Language::Compiled));
        }
        let started_at = now();
        let record = self.ensure_compiled(plugin, resolved).await?;
        let artifact_path = record.artifact_path.clone();
        let payload = context.to_payload().to_string();

        let call_result = tokio::time::timeout(
            context.timeout,
            tokio::task::spawn_blocking(move || {
                let artifact = LoadedArtifact::load(&artifact_path)?;
                artifact.call_execute(&payload)
            }),
        )
        .await;

        let ended_at = now();
        match call_result {
            Err(_elapsed) => Err(RuntimeSystemError::Cancelled {
                plugin_id: plugin.id.to_string(),
            }),
            Ok(Err(join_err)) => Err(RuntimeSystemError::ExecutionFailed {
                plugin_id: plugin.id.to_string(),
                message: join_err.to_string(),
            }),
            Ok(Ok(Err(message))) => Ok(ExecutionResult::failure(
                started_at,
                ended_at,
                "ExecutionFailed",
                message,
                Vec::new(),
            )),
            Ok(Ok(Ok(raw_output))) => {
                let output = serde_json::from_str(&raw_output)
                    .unwrap_or_else(|_| serde_json::Value::String(raw_output));
                Ok(ExecutionResult::success(started_at, ended_at, output, Vec::new()))
            }
        }
    }

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::model::{Language as L, PluginMetadata};

    struct AlwaysAvailableToolchain;

    #[async_trait]
    impl CompilerToolchain for AlwaysAvailableToolchain {
        async fn probe(&self) -> bool {
            true
        }

        async fn compile(&self, _build_dir: &Path) -> std::result::Result<Vec<u8>, String> {
            Ok(b"not a real shared library".to_vec())
        }
    }

    fn make_plugin(root: &Path) -> Plugin {
        std::fs::write(root.join("entry.ext"), "fn main() {}").unwrap();
        Plugin::new(
            PluginMetadata {
                name: "demo".to_string(),
                version: "1.0.0".to_string(),
                description: String::new(),
                language: L::Compiled,
            },
            PathBuf::from("entry.ext"),
            root.to_path_buf(),
            "hash".to_string(),
        )
    }

    #[test]
    fn cache_key_is_stable_for_identical_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = make_plugin(dir.path());
        let a = CompiledRuntimeManager::cache_key(&plugin);
        let b = CompiledRuntimeManager::cache_key(&plugin);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn initialize_marks_available_when_toolchain_probes_ok() {
        let cache_dir = tempfile::tempdir().unwrap();
        let manager = CompiledRuntimeManager::new(
            Arc::new(AlwaysAvailableToolchain),
            cache_dir.path().to_path_buf(),
        );
        manager.initialize().await.unwrap();
        assert!(manager.is_available());
    }

    #[tokio::test]
    async fn ensure_compiled_reuses_cache_on_second_call() {
        let cache_dir = tempfile::tempdir().unwrap();
        let plugin_dir = tempfile::tempdir().unwrap();
        let plugin = make_plugin(plugin_dir.path());
        let manager = CompiledRuntimeManager::new(
            Arc::new(AlwaysAvailableToolchain),
            cache_dir.path().to_path_buf(),
        );
        manager.initialize().await.unwrap();
        let resolved = ResolvedDependencyContext::default();
        let first = manager.ensure_compiled(&plugin, &resolved).await.unwrap();
        let second = manager.ensure_compiled(&plugin, &resolved).await.unwrap();
        assert_eq!(first.cache_key, second.cache_key);
        assert_eq!(first.artifact_path, second.artifact_path);
    }
}
