//! The plugin aggregate and its identity/status types.
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::plugin::dependency::PluginDependency;

/// Opaque stable plugin identifier, created at registration and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginId(Uuid);

impl PluginId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PluginId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the three language tags a plugin may declare in its manifest, each
/// routed to exactly one runtime manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Compiled/JIT language, handled by the compiled runtime manager.
    Compiled,
    /// Transpiled language with an ecosystem package manager.
    Transpiled,
    /// Interpreted language with its own package manager.
    Interpreted,
}

impl Language {
    pub fn from_manifest_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "compiled" => Some(Language::Compiled),
            "transpiled" => Some(Language::Transpiled),
            "interpreted" => Some(Language::Interpreted),
            _ => None,
        }
    }

    pub fn manifest_tag(&self) -> &'static str {
        match self {
            Language::Compiled => "compiled",
            Language::Transpiled => "transpiled",
            Language::Interpreted => "interpreted",
        }
    }

    /// Expected entry-point file extension, used by Discovery's language-specific check.
    pub fn expected_entry_point_extension(&self) -> &'static str {
        match self {
            Language::Compiled => "ext",
            Language::Transpiled => "ts",
            Language::Interpreted => "py",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manifest_tag())
    }
}

/// Plugin lifecycle status. See the state table: validate-ok/validate-fail/
/// admin-disable/admin-enable are the only transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginStatus {
    Registered,
    Available,
    Error,
    Disabled,
}

impl PluginStatus {
    pub fn on_validate_ok(self) -> Self {
        match self {
            PluginStatus::Disabled => PluginStatus::Disabled,
            _ => PluginStatus::Available,
        }
    }

    pub fn on_validate_fail(self) -> Self {
        match self {
            PluginStatus::Disabled => PluginStatus::Disabled,
            _ => PluginStatus::Error,
        }
    }

    pub fn on_admin_disable(self) -> Self {
        PluginStatus::Disabled
    }

    /// Only a disabled plugin responds to admin-enable, and it re-enters as
    /// `Registered` (re-validation decides Available vs Error from there).
    pub fn on_admin_enable(self) -> Self {
        match self {
            PluginStatus::Disabled => PluginStatus::Registered,
            other => other,
        }
    }
}

/// Plugin metadata carried alongside the identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub language: Language,
}

/// The plugin aggregate root.
#[derive(Debug, Clone)]
pub struct Plugin {
    pub id: PluginId,
    pub metadata: PluginMetadata,
    pub entry_point: PathBuf,
    pub root: PathBuf,
    pub capabilities: Vec<String>,
    pub dependencies: Vec<PluginDependency>,
    pub default_configuration: HashMap<String, Value>,
    pub status: PluginStatus,
    pub last_error: Option<String>,
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub source_hash: String,
}

impl Plugin {
    pub fn new(
        metadata: PluginMetadata,
        entry_point: PathBuf,
        root: PathBuf,
        source_hash: String,
    ) -> Self {
        Self {
            id: PluginId::new(),
            metadata,
            entry_point,
            root,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            default_configuration: HashMap::new(),
            status: PluginStatus::Registered,
            last_error: None,
            execution_count: 0,
            last_executed_at: None,
            source_hash,
        }
    }

    pub fn entry_point_absolute(&self) -> PathBuf {
        self.root.join(&self.entry_point)
    }

    pub fn mark_available(&mut self) {
        self.status = self.status.on_validate_ok();
        self.last_error = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = self.status.on_validate_fail();
        self.last_error = Some(message.into());
    }

    pub fn disable(&mut self) {
        self.status = self.status.on_admin_disable();
    }

    pub fn enable(&mut self) {
        self.status = self.status.on_admin_enable();
    }

    pub fn record_execution(&mut self, at: DateTime<Utc>) {
        self.execution_count += 1;
        self.last_executed_at = Some(at);
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, PluginStatus::Available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_the_state_table() {
        let mut status = PluginStatus::Registered;
        status = status.on_validate_ok();
        assert_eq!(status, PluginStatus::Available);

        status = status.on_validate_fail();
        assert_eq!(status, PluginStatus::Error);

        status = status.on_validate_ok();
        assert_eq!(status, PluginStatus::Available);

        status = status.on_admin_disable();
        assert_eq!(status, PluginStatus::Disabled);

        // Disabled ignores validate events.
        assert_eq!(status.on_validate_ok(), PluginStatus::Disabled);
        assert_eq!(status.on_validate_fail(), PluginStatus::Disabled);

        status = status.on_admin_enable();
        assert_eq!(status, PluginStatus::Registered);
    }

    #[test]
    fn language_tag_round_trips() {
        for lang in [Language::Compiled, Language::Transpiled, Language::Interpreted] {
            let tag = lang.manifest_tag();
            assert_eq!(Language::from_manifest_tag(tag), Some(lang));
        }
        assert_eq!(Language::from_manifest_tag("cobol"), None);
    }
}
