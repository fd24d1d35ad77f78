//! Plugin manifest parsing: `<plugin-root>/plugin.json`, case-insensitive keys.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::plugin::dependency::PluginDependency;
use crate::plugin::error::PluginSystemError;
use crate::plugin::model::Language;

/// A parsed, immutable manifest. Consumed by Discovery to construct a [`Plugin`](crate::plugin::model::Plugin).
#[derive(Debug, Clone)]
pub struct PluginManifest {
    pub path: PathBuf,
    pub last_modified: DateTime<Utc>,
    pub name: String,
    pub version: String,
    pub description: String,
    pub language: Language,
    pub entry_point: PathBuf,
    pub capabilities: Vec<String>,
    pub dependencies: Vec<PluginDependency>,
    pub configuration: HashMap<String, Value>,
    /// Keys not recognized by the schema, preserved verbatim.
    pub extra: HashMap<String, Value>,
}

const KNOWN_KEYS: &[&str] = &[
    "name",
    "version",
    "description",
    "language",
    "entrypoint",
    "capabilities",
    "dependencies",
    "configuration",
];

impl PluginManifest {
    /// Parses manifest JSON text. `path` is the absolute manifest path, used only
    /// for error messages and carried onto the parsed value.
    pub fn parse(path: &Path, last_modified: DateTime<Utc>, text: &str) -> Result<Self, PluginSystemError> {
        let value: Value = serde_json::from_str(text).map_err(|e| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let object = value.as_object().ok_or_else(|| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message: "manifest root must be a JSON object".to_string(),
        })?;

        // Case-insensitive key lookup: build a lowercase-key -> (original key, value) index.
        let mut lowered: HashMap<String, (&String, &Value)> = HashMap::new();
        for (k, v) in object {
            lowered.insert(k.to_ascii_lowercase(), (k, v));
        }

        let get_str = |key: &str| -> Option<String> {
            lowered.get(key).and_then(|(_, v)| v.as_str()).map(str::to_string)
        };

        let name = get_str("name").ok_or_else(|| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message: "missing required key 'name'".to_string(),
        })?;
        if name.is_empty() {
            return Err(PluginSystemError::ManifestParse {
                path: path.to_path_buf(),
                message: "'name' must not be empty".to_string(),
            });
        }

        let version = get_str("version").ok_or_else(|| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message: "missing required key 'version'".to_string(),
        })?;
        validate_version_format(&version).map_err(|message| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message,
        })?;

        let language_tag = get_str("language").ok_or_else(|| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message: "missing required key 'language'".to_string(),
        })?;
        let language = Language::from_manifest_tag(&language_tag).ok_or_else(|| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message: format!("unrecognized language tag '{language_tag}'"),
        })?;

        let entry_point = get_str("entrypoint").ok_or_else(|| PluginSystemError::ManifestParse {
            path: path.to_path_buf(),
            message: "missing required key 'entryPoint'".to_string(),
        })?;

        let description = get_str("description").unwrap_or_default();

        let capabilities = lowered
            .get("capabilities")
            .and_then(|(_, v)| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let mut dependencies = Vec::new();
        if let Some((_, v)) = lowered.get("dependencies") {
            if let Some(arr) = v.as_array() {
                for entry in arr {
                    let raw = entry.as_str().ok_or_else(|| PluginSystemError::ManifestParse {
                        path: path.to_path_buf(),
                        message: "'dependencies' entries must be strings".to_string(),
                    })?;
                    let dep = PluginDependency::parse(raw).map_err(|e| PluginSystemError::ManifestParse {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                    dependencies.push(dep);
                }
            }
        }

        let configuration = lowered
            .get("configuration")
            .and_then(|(_, v)| v.as_object())
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let mut extra = HashMap::new();
        for (lower_key, (orig_key, v)) in &lowered {
            if !KNOWN_KEYS.contains(&lower_key.as_str()) {
                extra.insert((*orig_key).clone(), (*v).clone());
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            last_modified,
            name,
            version,
            description,
            language,
            entry_point: PathBuf::from(entry_point),
            capabilities,
            dependencies,
            configuration,
            extra,
        })
    }
}

/// Validates `MAJOR.MINOR[.PATCH[.REV]]`: 2 to 4 dot-separated non-negative integers.
fn validate_version_format(version: &str) -> Result<(), String> {
    let parts: Vec<&str> = version.split('.').collect();
    if !(2..=4).contains(&parts.len()) {
        return Err(format!("'{version}' is not MAJOR.MINOR[.PATCH[.REV]]"));
    }
    for part in &parts {
        if part.parse::<u64>().is_err() {
            return Err(format!("'{version}' has a non-numeric component '{part}'"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_minimal_manifest() {
        let text = r#"{
            "name": "Greeter",
            "version": "1.0.0",
            "language": "compiled",
            "entryPoint": "hello.ext",
            "dependencies": ["packageA:Library@^1.0.0"]
        }"#;
        let manifest = PluginManifest::parse(Path::new("/plugins/greeter/plugin.json"), now(), text).unwrap();
        assert_eq!(manifest.name, "Greeter");
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.language, Language::Compiled);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let text = r#"{"NAME": "X", "Version": "1.0", "LANGUAGE": "interpreted", "EntryPoint": "main.py"}"#;
        let manifest = PluginManifest::parse(Path::new("/p/plugin.json"), now(), text).unwrap();
        assert_eq!(manifest.name, "X");
    }

    #[test]
    fn unknown_keys_are_preserved_as_extra() {
        let text = r#"{"name":"X","version":"1.0","language":"compiled","entryPoint":"a.ext","homepage":"https://example.invalid"}"#;
        let manifest = PluginManifest::parse(Path::new("/p/plugin.json"), now(), text).unwrap();
        assert!(manifest.extra.contains_key("homepage"));
    }

    #[test]
    fn rejects_bad_version_format() {
        let text = r#"{"name":"X","version":"not-a-version","language":"compiled","entryPoint":"a.ext"}"#;
        assert!(PluginManifest::parse(Path::new("/p/plugin.json"), now(), text).is_err());
    }

    #[test]
    fn rejects_unknown_language() {
        let text = r#"{"name":"X","version":"1.0","language":"cobol","entryPoint":"a.ext"}"#;
        assert!(PluginManifest::parse(Path::new("/p/plugin.json"), now(), text).is_err());
    }
}
