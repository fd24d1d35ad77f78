//! Per-invocation scratch working directories.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::kernel::error::Result as KernelResult;
use crate::storage::StorageProvider;

const CLEANUP_DELAY: Duration = Duration::from_millis(50);

/// Builds `<system-temp>/devflow-plugin-<sanitized-plugin-name>-<8-hex>/`.
pub fn scratch_dir_name(plugin_name: &str) -> String {
    let sanitized: String = plugin_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("devflow-plugin-{sanitized}-{suffix:08x}")
}

pub fn create(storage: &Arc<dyn StorageProvider>, plugin_name: &str) -> KernelResult<PathBuf> {
    let dir = std::env::temp_dir().join(scratch_dir_name(plugin_name));
    storage.create_dir_all(&dir)?;
    Ok(dir)
}

/// Best-effort delayed removal; failures are logged, never propagated, per the
/// engine-wide rule that scratch cleanup never fails an invocation.
pub async fn cleanup(storage: &Arc<dyn StorageProvider>, dir: &PathBuf) {
    tokio::time::sleep(CLEANUP_DELAY).await;
    if let Err(err) = storage.remove_dir_all(dir) {
        log::warn!("failed to remove scratch directory '{}': {err}", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorageProvider;

    #[test]
    fn scratch_dir_name_sanitizes_and_is_unique() {
        let a = scratch_dir_name("my plugin!");
        let b = scratch_dir_name("my plugin!");
        assert!(a.starts_with("devflow-plugin-my_plugin_-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_then_cleanup_round_trips() {
        let storage: Arc<dyn StorageProvider> = Arc::new(LocalStorageProvider::default());
        let dir = create(&storage, "test-plugin").unwrap();
        assert!(dir.exists());
        cleanup(&storage, &dir).await;
        assert!(!dir.exists());
    }
}
