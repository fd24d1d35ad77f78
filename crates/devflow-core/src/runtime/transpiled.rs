//! Runtime-T: the transpiled-language runtime manager. Prepares a per-plugin
//! cached environment via the ecosystem's package manager, transpiles the
//! entry point, then runs it under the interpreter through a small wrapper
//! script protocol (argv payload in, one JSON document on stdout).
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use tokio::process::Command;
use tokio::sync::Mutex as TokioMutex;

use crate::execution::{ExecutionContext, ExecutionResult};
use crate::kernel::constants::LOCK_MARKER_FILE_NAME;
use crate::plugin::{Language, Plugin};
use crate::resolver::ResolvedDependencyContext;
use crate::runtime::error::{Result, RuntimeSystemError};
use crate::runtime::{now, PluginCapabilities, RuntimeManager};
use crate::security::SecurityPolicy;

const RUNTIME_ID: &str = "runtime-transpiled";
const NATIVE_DESCRIPTOR_FILE_NAME: &str = "package.json";
const NATIVE_LOCKFILE_CANDIDATES: &[&str] = &["package-lock.json", "npm-shrinkwrap.json"];

const WRAPPER_SCRIPT: &str = r#"const mod = require(process.argv[3]);
const payload = Buffer.from(process.argv[2], 'base64').toString('utf8');
const context = JSON.parse(payload);
Promise.resolve(mod.execute(context))
    .then((result) => { process.stdout.write(JSON.stringify(result)); })
    .catch((err) => { process.stderr.write(String(err && err.message || err)); process.exitCode = 1; });
"#;

pub struct TranspiledRuntimeManager {
    interpreter_bin: String,
    package_manager_bin: String,
    cache_root: PathBuf,
    available: AtomicBool,
    env_locks: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl TranspiledRuntimeManager {
    pub fn new(interpreter_bin: impl Into<String>, package_manager_bin: impl Into<String>, cache_root: PathBuf) -> Self {
        Self {
            interpreter_bin: interpreter_bin.into(),
            package_manager_bin: package_manager_bin.into(),
            cache_root,
            available: AtomicBool::new(false),
            env_locks: TokioMutex::new(HashMap::new()),
        }
    }

    /// Hashes the plugin's own `package.json` (+ lockfile, if present) when one
    /// exists in the plugin root, matching the manifest-lock pair the setup step
    /// copies; falls back to hashing the resolver's resolved-package list for
    /// plugins whose only dependency declaration is the `plugin.json` manifest.
    fn dep_hash(plugin: &Plugin, resolved: &ResolvedDependencyContext) -> String {
        let mut hasher = Sha256::new();
        match native_descriptor(plugin) {
            Some((descriptor, lockfile)) => {
                hasher.update(&descriptor);
                if let Some(lockfile) = lockfile {
                    hasher.update(&lockfile);
                }
            }
            None => {
                for package in &resolved.packages {
                    hasher.update(package.name.as_bytes());
                    hasher.update(b"@");
                    hasher.update(package.version.as_bytes());
                    hasher.update(b";");
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }

    fn env_dir(&self, plugin: &Plugin, dep_hash: &str) -> PathBuf {
        self.cache_root.join(format!("{}-{dep_hash}", plugin.id))
    }

    async fn lock_for(&self, key: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.env_locks.lock().await;
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(TokioMutex::new(()))).clone()
    }

    async fn ensure_environment(&self, plugin: &Plugin, resolved: &ResolvedDependencyContext) -> Result<PathBuf> {
        let dep_hash = Self::dep_hash(plugin, resolved);
        let env_dir = self.env_dir(plugin, &dep_hash);
        let lock = self.lock_for(&format!("{}-{dep_hash}", plugin.id)).await;
        let _guard = lock.lock().await;

        let marker = env_dir.join(LOCK_MARKER_FILE_NAME);
        if marker.exists() {
            return Ok(env_dir);
        }

        tokio::fs::create_dir_all(&env_dir).await.map_err(|e| RuntimeSystemError::Io {
            operation: "create environment dir".to_string(),
            path: env_dir.clone(),
            source: e,
        })?;

        if let Some((descriptor_path, lockfile_path)) = native_descriptor_paths(plugin) {
            self.copy_into_env(&descriptor_path, &env_dir).await?;
            if let Some(lockfile_path) = lockfile_path {
                self.copy_into_env(&lockfile_path, &env_dir).await?;
            }
        } else {
            let descriptor = serde_json::json!({
                "name": plugin.metadata.name,
                "version": plugin.metadata.version,
                "dependencies": resolved.packages.iter().map(|p| (p.name.clone(), p.version.clone())).collect::<HashMap<_, _>>(),
            });
            tokio::fs::write(
                env_dir.join(NATIVE_DESCRIPTOR_FILE_NAME),
                serde_json::to_vec_pretty(&descriptor).unwrap_or_default(),
            )
            .await
            .map_err(|e| RuntimeSystemError::Io {
                operation: "write project descriptor".to_string(),
                path: env_dir.clone(),
                source: e,
            })?;
        }

        let install = Command::new(&self.package_manager_bin)
            .arg("install")
            .current_dir(&env_dir)
            .output()
            .await
            .map_err(|e| RuntimeSystemError::EnvironmentPreparationFailed {
                plugin_id: plugin.id.to_string(),
                message: e.to_string(),
            })?;
        if !install.status.success() {
            return Err(RuntimeSystemError::EnvironmentPreparationFailed {
                plugin_id: plugin.id.to_string(),
                message: String::from_utf8_lossy(&install.stderr).into_owned(),
            });
        }

        tokio::fs::write(&marker, b"").await.map_err(|e| RuntimeSystemError::Io {
            operation: "write lock marker".to_string(),
            path: marker,
            source: e,
        })?;

        Ok(env_dir)
    }

    async fn copy_into_env(&self, source: &Path, env_dir: &Path) -> Result<()> {
        let file_name = source.file_name().expect("native_descriptor_paths only returns file paths");
        tokio::fs::copy(source, env_dir.join(file_name)).await.map_err(|e| RuntimeSystemError::Io {
            operation: "copy native dependency file".to_string(),
            path: source.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    async fn copy_source(&self, plugin: &Plugin, env_dir: &Path) -> Result<PathBuf> {
        let dest = env_dir.join(&plugin.entry_point);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| RuntimeSystemError::Io {
                operation: "create entry-point parent dir".to_string(),
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        tokio::fs::copy(plugin.entry_point_absolute(), &dest)
            .await
            .map_err(|e| RuntimeSystemError::Io {
                operation: "copy plugin source".to_string(),
                path: plugin.entry_point_absolute(),
                source: e,
            })?;
        Ok(dest)
    }

    async fn run_build_step(&self, env_dir: &Path, logs: &mut Vec<String>) {
        let output = Command::new(&self.package_manager_bin)
            .arg("run")
            .arg("build")
            .current_dir(env_dir)
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => logs.push("transpile build step completed".to_string()),
            Ok(out) => logs.push(format!(
                "transpile build step skipped or failed: {}",
                String::from_utf8_lossy(&out.stderr)
            )),
            Err(e) => logs.push(format!("transpile build step unavailable: {e}")),
        }
    }
}

/// Locates the plugin's own `package.json` (+ lockfile, if any) under its root,
/// next to the entry point, returning their paths when the descriptor exists.
fn native_descriptor_paths(plugin: &Plugin) -> Option<(PathBuf, Option<PathBuf>)> {
    let descriptor = plugin.root.join(NATIVE_DESCRIPTOR_FILE_NAME);
    if !descriptor.is_file() {
        return None;
    }
    let lockfile = NATIVE_LOCKFILE_CANDIDATES
        .iter()
        .map(|name| plugin.root.join(name))
        .find(|path| path.is_file());
    Some((descriptor, lockfile))
}

fn native_descriptor(plugin: &Plugin) -> Option<(Vec<u8>, Option<Vec<u8>>)> {
    let (descriptor_path, lockfile_path) = native_descriptor_paths(plugin)?;
    let descriptor = std::fs::read(&descriptor_path).ok()?;
    let lockfile = lockfile_path.and_then(|path| std::fs::read(path).ok());
    Some((descriptor, lockfile))
}

fn parse_wrapper_output(stdout: &str) -> serde_json::Value {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}

#[async_trait]
impl RuntimeManager for TranspiledRuntimeManager {
    fn language(&self) -> Language {
        Language::Transpiled
    }

    fn runtime_id(&self) -> &'static str {
        RUNTIME_ID
    }

    async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_root).await.ok();
        let interpreter_ok = Command::new(&self.interpreter_bin)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        let package_manager_ok = Command::new(&self.package_manager_bin)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        self.available.store(interpreter_ok && package_manager_ok, Ordering::SeqCst);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn validate(&self, plugin: &Plugin) -> Result<PluginCapabilities> {
        let mut reasons = Vec::new();
        if !self.is_available() {
            reasons.push("interpreter or package manager not found on PATH".to_string());
        }
        Ok(PluginCapabilities {
            executable: reasons.is_empty(),
            language: Language::Transpiled,
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
            return Err(RuntimeSystemError::RuntimeUnavailable(Language::Transpiled));
        }
        let started_at = now();
        let mut logs = Vec::new();

        let env_dir = self.ensure_environment(plugin, resolved).await?;
        let entry_path = self.copy_source(plugin, &env_dir).await?;
        self.run_build_step(&env_dir, &mut logs).await;

        let wrapper_path = env_dir.join("devflow-wrapper.js");
        tokio::fs::write(&wrapper_path, WRAPPER_SCRIPT)
            .await
            .map_err(|e| RuntimeSystemError::Io {
                operation: "write wrapper script".to_string(),
                path: wrapper_path.clone(),
                source: e,
            })?;

        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(context.to_payload().to_string());

        let run_result = tokio::time::timeout(
            context.timeout,
            Command::new(&self.interpreter_bin)
                .arg(&wrapper_path)
                .arg(payload_b64)
                .arg(&entry_path)
                .current_dir(&env_dir)
                .output(),
        )
        .await;

        let ended_at = now();
        match run_result {
            Err(_elapsed) => Err(RuntimeSystemError::Cancelled {
                plugin_id: plugin.id.to_string(),
            }),
            Ok(Err(io_err)) => Err(RuntimeSystemError::ExecutionFailed {
                plugin_id: plugin.id.to_string(),
                message: io_err.to_string(),
            }),
            Ok(Ok(output)) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                Ok(ExecutionResult::success(started_at, ended_at, parse_wrapper_output(&stdout), logs)
                    .with_exit_code(output.status.code().unwrap_or(0)))
            }
            Ok(Ok(output)) => Ok(ExecutionResult::failure(
                started_at,
                ended_at,
                "ExecutionFailed",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
                logs,
            )
            .with_exit_code(output.status.code().unwrap_or(-1))),
        }
    }

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin_without_descriptor(root: &Path) -> Plugin {
        Plugin::new(
            crate::plugin::model::PluginMetadata {
                name: "demo".to_string(),
                version: "1.0.0".to_string(),
                description: String::new(),
                language: Language::Transpiled,
            },
            PathBuf::from("entry.ts"),
            root.to_path_buf(),
            "hash".to_string(),
        )
    }

    #[test]
    fn dep_hash_is_order_sensitive_but_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin = plugin_without_descriptor(tmp.path());
        let mut ctx = ResolvedDependencyContext::default();
        ctx.packages.push(crate::resolver::ResolvedPackage {
            name: "left-pad".to_string(),
            version: "1.0.0".to_string(),
            artifact_paths: Vec::new(),
            install_path: PathBuf::new(),
            platform: "linux-x86_64".to_string(),
        });
        let a = TranspiledRuntimeManager::dep_hash(&plugin, &ctx);
        let b = TranspiledRuntimeManager::dep_hash(&plugin, &ctx);
        assert_eq!(a, b);
    }

    #[test]
    fn dep_hash_prefers_native_descriptor_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("package.json"), r#"{"name":"demo","dependencies":{}}"#).unwrap();
        let plugin = plugin_without_descriptor(tmp.path());
        let ctx = ResolvedDependencyContext::default();
        let from_descriptor = TranspiledRuntimeManager::dep_hash(&plugin, &ctx);

        std::fs::write(tmp.path().join("package.json"), r#"{"name":"demo","dependencies":{"left-pad":"1.0.0"}}"#).unwrap();
        let from_changed_descriptor = TranspiledRuntimeManager::dep_hash(&plugin, &ctx);
        assert_ne!(from_descriptor, from_changed_descriptor);
    }

    #[test]
    fn parse_wrapper_output_falls_back_to_raw_string() {
        assert_eq!(parse_wrapper_output(" not json "), serde_json::Value::String("not json".to_string()));
        assert_eq!(parse_wrapper_output("{\"a\":1}"), serde_json::json!({"a": 1}));
    }
}
