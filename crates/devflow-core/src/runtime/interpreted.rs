//! Runtime-I: the interpreted-language runtime manager. Prepares a per-plugin
//! virtual environment, installs declared dependencies through the
//! interpreter's companion package installer, and runs the entry point
//! through a wrapper script under the same argv/stdout protocol as Runtime-T.
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

const RUNTIME_ID: &str = "runtime-interpreted";
const CANDIDATE_INTERPRETERS: &[&str] = &["python3", "python"];
const NATIVE_DECLARATION_FILE_NAME: &str = "requirements.txt";

const WRAPPER_SCRIPT: &str = r#"import asyncio
import base64
import importlib.util
import inspect
import json
import sys

payload = json.loads(base64.b64decode(sys.argv[1]).decode("utf-8"))
spec = importlib.util.spec_from_file_location("devflow_entry", sys.argv[2])
module = importlib.util.module_from_spec(spec)
spec.loader.exec_module(module)

target = None
for name in dir(module):
    obj = getattr(module, name)
    if inspect.isclass(obj) and "Plugin" in name:
        instance = obj()
        target = getattr(instance, "execute_async", None) or getattr(instance, "execute", None)
        break
if target is None:
    target = getattr(module, "execute_async", None) or getattr(module, "execute", None)

try:
    result = target(payload)
    if inspect.iscoroutine(result):
        result = asyncio.run(result)
    sys.stdout.write(json.dumps(result))
except Exception as exc:
    sys.stderr.write(str(exc))
    sys.exit(1)
"#;

pub struct InterpretedRuntimeManager {
    interpreter_bin: TokioMutex<Option<String>>,
    cache_root: PathBuf,
    available: AtomicBool,
    env_locks: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

impl InterpretedRuntimeManager {
    pub fn new(cache_root: PathBuf) -> Self {
        Self {
            interpreter_bin: TokioMutex::new(None),
            cache_root,
            available: AtomicBool::new(false),
            env_locks: TokioMutex::new(HashMap::new()),
        }
    }

    /// Hashes the plugin's own `requirements.txt` when one exists in the plugin
    /// root; falls back to hashing the resolver's resolved-package list for
    /// plugins whose only dependency declaration is the `plugin.json` manifest.
    fn dep_hash(plugin: &Plugin, resolved: &ResolvedDependencyContext) -> String {
        let mut hasher = Sha256::new();
        match native_declaration(plugin) {
            Some(declaration) => hasher.update(&declaration),
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

    async fn interpreter(&self) -> Option<String> {
        self.interpreter_bin.lock().await.clone()
    }

    async fn ensure_environment(&self, plugin: &Plugin, resolved: &ResolvedDependencyContext) -> Result<PathBuf> {
        let interpreter = self.interpreter().await.ok_or(RuntimeSystemError::RuntimeUnavailable(Language::Interpreted))?;
        let dep_hash = Self::dep_hash(plugin, resolved);
        let env_dir = self.env_dir(plugin, &dep_hash);
        let lock = self.lock_for(&format!("{}-{dep_hash}", plugin.id)).await;
        let _guard = lock.lock().await;

        let marker = env_dir.join(LOCK_MARKER_FILE_NAME);
        if marker.exists() {
            return Ok(env_dir);
        }

        let venv = Command::new(&interpreter)
            .arg("-m")
            .arg("venv")
            .arg(&env_dir)
            .output()
            .await
            .map_err(|e| RuntimeSystemError::EnvironmentPreparationFailed {
                plugin_id: plugin.id.to_string(),
                message: e.to_string(),
            })?;
        if !venv.status.success() {
            return Err(RuntimeSystemError::EnvironmentPreparationFailed {
                plugin_id: plugin.id.to_string(),
                message: String::from_utf8_lossy(&venv.stderr).into_owned(),
            });
        }

        let requirements_path = env_dir.join(NATIVE_DECLARATION_FILE_NAME);
        match native_declaration_path(plugin) {
            Some(source_path) => {
                tokio::fs::copy(&source_path, &requirements_path).await.map_err(|e| RuntimeSystemError::Io {
                    operation: "copy native dependency declaration file".to_string(),
                    path: source_path,
                    source: e,
                })?;
            }
            None => {
                let requirements = resolved
                    .packages
                    .iter()
                    .map(|p| format!("{}=={}", p.name, p.version))
                    .collect::<Vec<_>>()
                    .join("\n");
                tokio::fs::write(&requirements_path, requirements).await.map_err(|e| RuntimeSystemError::Io {
                    operation: "write requirements file".to_string(),
                    path: requirements_path.clone(),
                    source: e,
                })?;
            }
        }

        let venv_python = env_dir.join("bin").join("python");
        let install = Command::new(&venv_python)
            .arg("-m")
            .arg("pip")
            .arg("install")
            .arg("-r")
            .arg(&requirements_path)
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
}

/// Locates the plugin's own `requirements.txt` under its root, next to the entry point.
fn native_declaration_path(plugin: &Plugin) -> Option<PathBuf> {
    let path = plugin.root.join(NATIVE_DECLARATION_FILE_NAME);
    path.is_file().then_some(path)
}

fn native_declaration(plugin: &Plugin) -> Option<Vec<u8>> {
    std::fs::read(native_declaration_path(plugin)?).ok()
}

fn parse_wrapper_output(stdout: &str) -> serde_json::Value {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}

#[async_trait]
impl RuntimeManager for InterpretedRuntimeManager {
    fn language(&self) -> Language {
        Language::Interpreted
    }

    fn runtime_id(&self) -> &'static str {
        RUNTIME_ID
    }

    async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_root).await.ok();
        let mut found = None;
        for candidate in CANDIDATE_INTERPRETERS {
            let ok = Command::new(candidate)
                .arg("--version")
                .output()
                .await
                .map(|o| o.status.success())
                .unwrap_or(false);
            if ok {
                found = Some(candidate.to_string());
                break;
            }
        }
        self.available.store(found.is_some(), Ordering::SeqCst);
        *self.interpreter_bin.lock().await = found;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn validate(&self, plugin: &Plugin) -> Result<PluginCapabilities> {
        let mut reasons = Vec::new();
        if !self.is_available() {
            reasons.push("no candidate interpreter found on PATH".to_string());
        }
        Ok(PluginCapabilities {
            executable: reasons.is_empty(),
            language: Language::Interpreted,
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
            return Err(RuntimeSystemError::RuntimeUnavailable(Language::Interpreted));
        }
        let started_at = now();
        let logs = Vec::new();

        let env_dir = self.ensure_environment(plugin, resolved).await?;
        let entry_path = self.copy_source(plugin, &env_dir).await?;

        let wrapper_path = env_dir.join("devflow_wrapper.py");
        tokio::fs::write(&wrapper_path, WRAPPER_SCRIPT)
            .await
            .map_err(|e| RuntimeSystemError::Io {
                operation: "write wrapper script".to_string(),
                path: wrapper_path.clone(),
                source: e,
            })?;

        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(context.to_payload().to_string());
        let venv_python = env_dir.join("bin").join("python");

        let run_result = tokio::time::timeout(
            context.timeout,
            Command::new(&venv_python)
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

    fn demo_plugin(root: &Path) -> Plugin {
        Plugin::new(
            crate::plugin::model::PluginMetadata {
                name: "demo".to_string(),
                version: "1.0.0".to_string(),
                description: String::new(),
                language: Language::Interpreted,
            },
            PathBuf::from("entry.py"),
            root.to_path_buf(),
            "hash".to_string(),
        )
    }

    #[test]
    fn dep_hash_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin = demo_plugin(tmp.path());
        let ctx = ResolvedDependencyContext::default();
        assert_eq!(
            InterpretedRuntimeManager::dep_hash(&plugin, &ctx),
            InterpretedRuntimeManager::dep_hash(&plugin, &ctx)
        );
    }

    #[test]
    fn dep_hash_prefers_native_declaration_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "left-pad==1.0.0\n").unwrap();
        let plugin = demo_plugin(tmp.path());
        let ctx = ResolvedDependencyContext::default();
        let from_declaration = InterpretedRuntimeManager::dep_hash(&plugin, &ctx);

        std::fs::write(tmp.path().join("requirements.txt"), "left-pad==2.0.0\n").unwrap();
        let from_changed_declaration = InterpretedRuntimeManager::dep_hash(&plugin, &ctx);
        assert_ne!(from_declaration, from_changed_declaration);
    }

    #[tokio::test]
    async fn ensure_environment_fails_cleanly_without_interpreter() {
        let manager = InterpretedRuntimeManager::new(tempfile::tempdir().unwrap().path().to_path_buf());
        let plugin_dir = tempfile::tempdir().unwrap();
        std::fs::write(plugin_dir.path().join("entry.py"), "def execute(ctx):\n    return ctx\n").unwrap();
        let plugin = demo_plugin(plugin_dir.path());
        let resolved = ResolvedDependencyContext::default();
        let result = manager.ensure_environment(&plugin, &resolved).await;
        assert!(matches!(result, Err(RuntimeSystemError::RuntimeUnavailable(Language::Interpreted))));
    }
}
