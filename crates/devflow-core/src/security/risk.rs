//! Static risk assessment: regex pattern families over an entry-point's source
//! text, plus a vulnerable-packages cross-check against declared dependencies.
//! This is a heuristic, not a sandbox — see the crate-level design notes.
use std::collections::HashSet;

use regex::Regex;

use crate::plugin::PluginDependency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Risk {
    pub severity: Severity,
    pub category: &'static str,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    Low,
    Medium,
    High,
}

struct Pattern {
    regex: Regex,
    severity: Severity,
    category: &'static str,
    description: &'static str,
}

pub struct RiskAssessor {
    patterns: Vec<Pattern>,
    vulnerable_packages: HashSet<String>,
}

impl RiskAssessor {
    pub fn new(vulnerable_packages: HashSet<String>) -> Self {
        let raw: &[(&str, Severity, &'static str, &'static str)] = &[
            // Dangerous filesystem calls.
            (r"(?i)\bremove_dir_all\b|\bfs::remove\b|\bDeleteFile\b|\brmtree\b", Severity::High, "filesystem", "recursive or irrecoverable file deletion"),
            (r"(?i)\bchmod\s*\(|\bset_permissions\b", Severity::Medium, "filesystem", "permission modification"),
            // Network call surfaces.
            (r"(?i)\bTcpStream\b|\bHttpClient\b|\bfetch\s*\(|\bsocket\s*\(|\brequests\.(get|post)\b", Severity::Medium, "network", "outbound network call surface"),
            (r"(?i)\bbind\s*\(.*0\.0\.0\.0", Severity::High, "network", "binds a listener on all interfaces"),
            // Reflection / FFI / unsafe memory.
            (r"(?i)\bunsafe\s*\{", Severity::Medium, "unsafe", "unsafe code block"),
            (r"(?i)\bdlopen\b|\bLoadLibrary\b|\bctypes\.CDLL\b|\bFFI\b", Severity::High, "ffi", "dynamic library loading / FFI surface"),
            (r"(?i)\beval\s*\(|\bexec\s*\(|\bReflection\.", Severity::Critical, "reflection", "dynamic code execution or reflection"),
        ];
        let patterns = raw
            .iter()
            .map(|(pattern, severity, category, description)| Pattern {
                regex: Regex::new(pattern).expect("risk pattern is a valid static regex"),
                severity: *severity,
                category,
                description,
            })
            .collect();
        Self {
            patterns,
            vulnerable_packages: vulnerable_packages
                .into_iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn assess(&self, entry_point_source: &str, declared_dependencies: &[PluginDependency]) -> Vec<Risk> {
        let mut risks = Vec::new();
        for pattern in &self.patterns {
            if pattern.regex.is_match(entry_point_source) {
                risks.push(Risk {
                    severity: pattern.severity,
                    category: pattern.category,
                    description: pattern.description.to_string(),
                });
            }
        }
        for dep in declared_dependencies {
            if self.vulnerable_packages.contains(&dep.name.to_ascii_lowercase()) {
                risks.push(Risk {
                    severity: Severity::Critical,
                    category: "vulnerable-dependency",
                    description: format!("declared dependency '{}' is on the vulnerable-packages list", dep.name),
                });
            }
        }
        risks
    }

    /// any High/Critical -> Low; more than two Medium -> Low; any Medium -> Medium; else High.
    pub fn trust_level(risks: &[Risk]) -> TrustLevel {
        let high_or_worse = risks.iter().filter(|r| r.severity >= Severity::High).count();
        let medium = risks.iter().filter(|r| r.severity == Severity::Medium).count();
        if high_or_worse > 0 {
            TrustLevel::Low
        } else if medium > 2 {
            TrustLevel::Low
        } else if medium > 0 {
            TrustLevel::Medium
        } else {
            TrustLevel::High
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_unsafe_block() {
        let assessor = RiskAssessor::new(HashSet::new());
        let risks = assessor.assess("fn main() { unsafe { do_thing(); } }", &[]);
        assert!(risks.iter().any(|r| r.category == "unsafe"));
    }

    #[test]
    fn high_risk_forces_low_trust() {
        let assessor = RiskAssessor::new(HashSet::new());
        let risks = assessor.assess("dlopen(\"libfoo.so\")", &[]);
        assert_eq!(RiskAssessor::trust_level(&risks), TrustLevel::Low);
    }

    #[test]
    fn more_than_two_medium_forces_low_trust() {
        let assessor = RiskAssessor::new(HashSet::new());
        let source = "unsafe { a(); } requests.get(url); chmod(path, 0o777);";
        let risks = assessor.assess(source, &[]);
        assert_eq!(RiskAssessor::trust_level(&risks), TrustLevel::Low);
    }

    #[test]
    fn clean_source_is_fully_trusted() {
        let assessor = RiskAssessor::new(HashSet::new());
        let risks = assessor.assess("fn execute() { 1 + 1; }", &[]);
        assert!(risks.is_empty());
        assert_eq!(RiskAssessor::trust_level(&risks), TrustLevel::High);
    }

    #[test]
    fn vulnerable_dependency_is_flagged() {
        let mut vulnerable = HashSet::new();
        vulnerable.insert("badlib".to_string());
        let assessor = RiskAssessor::new(vulnerable);
        let dep = PluginDependency::parse("packageA:BadLib@1.0.0").unwrap();
        let risks = assessor.assess("", std::slice::from_ref(&dep));
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].severity, Severity::Critical);
    }
}
