use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plugin::version::VersionSpecifier;

/// The three ecosystem-package kinds, a sibling-plugin reference, or a bare file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    EcosystemPackageA,
    EcosystemPackageB,
    EcosystemPackageC,
    SiblingPlugin,
    FileReference,
}

impl DependencyKind {
    /// Maps the manifest grammar's `kind` token (`packageA`, `plugin`, ...) to a variant.
    pub fn from_manifest_token(token: &str) -> Option<Self> {
        match token {
            "packageA" => Some(DependencyKind::EcosystemPackageA),
            "packageB" => Some(DependencyKind::EcosystemPackageB),
            "packageC" => Some(DependencyKind::EcosystemPackageC),
            "plugin" => Some(DependencyKind::SiblingPlugin),
            "file" => Some(DependencyKind::FileReference),
            _ => None,
        }
    }

    pub fn manifest_token(&self) -> &'static str {
        match self {
            DependencyKind::EcosystemPackageA => "packageA",
            DependencyKind::EcosystemPackageB => "packageB",
            DependencyKind::EcosystemPackageC => "packageC",
            DependencyKind::SiblingPlugin => "plugin",
            DependencyKind::FileReference => "file",
        }
    }

    pub fn is_ecosystem_package(&self) -> bool {
        matches!(
            self,
            DependencyKind::EcosystemPackageA
                | DependencyKind::EcosystemPackageB
                | DependencyKind::EcosystemPackageC
        )
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manifest_token())
    }
}

/// A single declared dependency: `kind:name@specifier`.
///
/// For [`DependencyKind::FileReference`], `name` holds the path and is mirrored into
/// `source` per the manifest grammar.
#[derive(Debug, Clone)]
pub struct PluginDependency {
    pub name: String,
    pub specifier: VersionSpecifier,
    pub kind: DependencyKind,
    /// Feed URL for ecosystem kinds, or the declared path for `FileReference`.
    pub source: Option<String>,
}

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("dependency specifier '{0}' does not match 'kind:name@specifier'")]
    MalformedSpecifier(String),

    #[error("unknown dependency kind token '{0}'")]
    UnknownKind(String),

    #[error("required dependency not found: {0}")]
    MissingPlugin(String),

    #[error("version mismatch: '{plugin_name}' requires '{required}' but found '{actual}'")]
    IncompatibleVersion {
        plugin_name: String,
        required: String,
        actual: String,
    },

    #[error("circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

impl PluginDependency {
    /// Parses one manifest dependency string per the grammar
    /// `^[a-z]+:[^@]+@.+$`.
    pub fn parse(raw: &str) -> Result<Self, DependencyError> {
        let (kind_token, rest) = raw
            .split_once(':')
            .ok_or_else(|| DependencyError::MalformedSpecifier(raw.to_string()))?;
        let (name, specifier) = rest
            .split_once('@')
            .ok_or_else(|| DependencyError::MalformedSpecifier(raw.to_string()))?;
        if name.is_empty() {
            return Err(DependencyError::MalformedSpecifier(raw.to_string()));
        }
        let kind = DependencyKind::from_manifest_token(kind_token)
            .ok_or_else(|| DependencyError::UnknownKind(kind_token.to_string()))?;
        let source = matches!(kind, DependencyKind::FileReference).then(|| name.to_string());
        Ok(Self {
            name: name.to_string(),
            specifier: VersionSpecifier::parse(specifier),
            kind,
            source,
        })
    }

    /// Graph/cache key, `kind:name@specifier`, as used by the resolver's
    /// in-progress/memoization maps and the dependency cache path.
    pub fn graph_key(&self) -> String {
        format!("{}:{}@{}", self.kind.manifest_token(), self.name, self.specifier)
    }

    pub fn is_compatible_with(&self, candidate_version: &str) -> bool {
        self.specifier.satisfies(candidate_version)
    }
}

impl fmt::Display for PluginDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.name, self.specifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ecosystem_dependency() {
        let dep = PluginDependency::parse("packageA:Library@^1.0.0").unwrap();
        assert_eq!(dep.name, "Library");
        assert_eq!(dep.kind, DependencyKind::EcosystemPackageA);
        assert!(dep.is_compatible_with("1.2.0"));
        assert!(!dep.is_compatible_with("2.0.0"));
    }

    #[test]
    fn file_reference_mirrors_name_into_source() {
        let dep = PluginDependency::parse("file:./lib/helper.dat@*").unwrap();
        assert_eq!(dep.kind, DependencyKind::FileReference);
        assert_eq!(dep.source.as_deref(), Some("./lib/helper.dat"));
    }

    #[test]
    fn rejects_malformed_specifier() {
        assert!(PluginDependency::parse("packageA-Library-1.0.0").is_err());
        assert!(PluginDependency::parse("unknownkind:Foo@1.0.0").is_err());
    }

    #[test]
    fn graph_key_round_trips_components() {
        let dep = PluginDependency::parse("plugin:Sibling@~1.2").unwrap();
        assert_eq!(dep.graph_key(), "plugin:Sibling@~1.2");
    }
}
