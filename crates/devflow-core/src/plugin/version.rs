//! Dependency version-specifier grammar.
//!
//! This is deliberately *not* `semver::VersionReq` — the specifier grammar a plugin
//! manifest may declare (`^1.2.3`, `~1.2`, `>=2.0`, `*`, a bare tag like `edge`) has its
//! own tilde/caret rules and a string-equality fallback for anything that doesn't parse
//! as a clean numeric tuple. `semver::Version` is still used downstream to rank a list
//! of candidate versions once filtering by a specifier is done (see [`pick_highest`]).
use std::fmt;

/// A parsed numeric triple, with trailing components a tilde specifier omitted
/// tracked as `None` so `~1` and `~1.2` can be told apart from `~1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartialVersion {
    major: u64,
    minor: Option<u64>,
    patch: Option<u64>,
}

impl PartialVersion {
    fn filled(&self) -> (u64, u64, u64) {
        (self.major, self.minor.unwrap_or(0), self.patch.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparatorOp {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
}

impl ComparatorOp {
    fn apply(&self, lhs: (u64, u64, u64), rhs: (u64, u64, u64)) -> bool {
        match self {
            ComparatorOp::Ge => lhs >= rhs,
            ComparatorOp::Gt => lhs > rhs,
            ComparatorOp::Le => lhs <= rhs,
            ComparatorOp::Lt => lhs < rhs,
            ComparatorOp::Eq => lhs == rhs,
            ComparatorOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SpecifierKind {
    /// `*`, `latest`, or an empty string: any version satisfies.
    Wildcard,
    /// A bare numeric version: `1.2.3`.
    Exact((u64, u64, u64)),
    /// `^X.Y.Z`.
    Caret((u64, u64, u64)),
    /// `~X`, `~X.Y`, or `~X.Y.Z`.
    Tilde(PartialVersion),
    /// A comparator applied to a numeric triple.
    Comparator(ComparatorOp, (u64, u64, u64)),
    /// Anything that didn't parse as one of the above: compared case-insensitively
    /// against the candidate's raw string.
    Literal(String),
}

/// A parsed dependency version specifier, per the grammar in the manifest format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpecifier {
    raw: String,
    kind: SpecifierKind,
}

impl VersionSpecifier {
    /// Parses a specifier string. Never fails: anything that doesn't match a
    /// recognized shape becomes a [`SpecifierKind::Literal`] fallback.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let kind = if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("*")
            || trimmed.eq_ignore_ascii_case("latest")
        {
            SpecifierKind::Wildcard
        } else if let Some(rest) = trimmed.strip_prefix('^') {
            match parse_triple(rest) {
                Some(v) => SpecifierKind::Caret(v),
                None => SpecifierKind::Literal(raw.to_string()),
            }
        } else if let Some(rest) = trimmed.strip_prefix('~') {
            match parse_partial(rest) {
                Some(v) => SpecifierKind::Tilde(v),
                None => SpecifierKind::Literal(raw.to_string()),
            }
        } else if let Some((op, rest)) = strip_comparator(trimmed) {
            match parse_triple(rest.trim()) {
                Some(v) => SpecifierKind::Comparator(op, v),
                None => SpecifierKind::Literal(raw.to_string()),
            }
        } else {
            match parse_triple(trimmed) {
                Some(v) => SpecifierKind::Exact(v),
                None => SpecifierKind::Literal(raw.to_string()),
            }
        };
        Self {
            raw: raw.to_string(),
            kind,
        }
    }

    /// Returns whether `candidate` satisfies this specifier.
    pub fn satisfies(&self, candidate: &str) -> bool {
        match &self.kind {
            SpecifierKind::Wildcard => true,
            SpecifierKind::Literal(s) => s.eq_ignore_ascii_case(candidate),
            other => match parse_triple(candidate.trim()) {
                Some(c) => matches_numeric(other, c),
                None => self.raw.eq_ignore_ascii_case(candidate),
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn matches_numeric(kind: &SpecifierKind, candidate: (u64, u64, u64)) -> bool {
    match kind {
        SpecifierKind::Wildcard => true,
        SpecifierKind::Literal(_) => false,
        SpecifierKind::Exact(v) => *v == candidate,
        SpecifierKind::Caret(v) => caret_matches(*v, candidate),
        SpecifierKind::Tilde(v) => tilde_matches(*v, candidate),
        SpecifierKind::Comparator(op, v) => op.apply(candidate, *v),
    }
}

fn caret_matches(v: (u64, u64, u64), c: (u64, u64, u64)) -> bool {
    if c < v {
        return false;
    }
    let (x, y, z) = v;
    if x > 0 {
        c.0 == x
    } else if y > 0 {
        c.0 == 0 && c.1 == y
    } else {
        c.0 == 0 && c.1 == 0 && c.2 == z
    }
}

fn tilde_matches(v: PartialVersion, c: (u64, u64, u64)) -> bool {
    if c < v.filled() {
        return false;
    }
    match (v.minor, v.patch) {
        (None, None) => c.0 == v.major,
        (Some(m), _) => c.0 == v.major && c.1 == m,
        (None, Some(_)) => unreachable!("parse_partial never sets patch without minor"),
    }
}

fn strip_comparator(s: &str) -> Option<(ComparatorOp, &str)> {
    const OPS: &[(&str, ComparatorOp)] = &[
        (">=", ComparatorOp::Ge),
        ("<=", ComparatorOp::Le),
        ("==", ComparatorOp::Eq),
        ("!=", ComparatorOp::Ne),
        (">", ComparatorOp::Gt),
        ("<", ComparatorOp::Lt),
    ];
    for (symbol, op) in OPS {
        if let Some(rest) = s.strip_prefix(symbol) {
            return Some((*op, rest));
        }
    }
    None
}

/// Parses a numeric dot-separated version with 1-3 components, filling missing
/// trailing components with zero. Rejects anything non-numeric (pre-release tags,
/// build metadata) so the caller can fall back to string-equality semantics.
fn parse_triple(s: &str) -> Option<(u64, u64, u64)> {
    parse_partial(s).map(|p| p.filled())
}

fn parse_partial(s: &str) -> Option<PartialVersion> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let major = parts[0].parse().ok()?;
    let minor = parts.get(1).map(|p| p.parse()).transpose().ok()?;
    let patch = parts.get(2).map(|p| p.parse()).transpose().ok()?;
    Some(PartialVersion {
        major,
        minor,
        patch,
    })
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl std::str::FromStr for VersionSpecifier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VersionSpecifier::parse(s))
    }
}

/// Picks the highest of `candidates` that satisfies `spec`, ordering candidates that
/// parse as `semver::Version` by semver precedence and falling back to the raw
/// numeric triple for candidates `semver` rejects (e.g. missing a patch component).
pub fn pick_highest<'a>(spec: &VersionSpecifier, candidates: &'a [String]) -> Option<&'a str> {
    candidates
        .iter()
        .filter(|c| spec.satisfies(c))
        .max_by(|a, b| compare_versions(a, b))
        .map(|s| s.as_str())
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => parse_triple(a).cmp(&parse_triple(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_forms_always_satisfy() {
        for raw in ["*", "", "latest", "LATEST"] {
            let spec = VersionSpecifier::parse(raw);
            assert!(spec.satisfies("0.0.1"));
            assert!(spec.satisfies("9.9.9"));
        }
    }

    #[test]
    fn caret_major_nonzero_locks_major() {
        let spec = VersionSpecifier::parse("^1.2.3");
        assert!(spec.satisfies("1.2.3"));
        assert!(spec.satisfies("1.9.0"));
        assert!(!spec.satisfies("2.0.0"));
        assert!(!spec.satisfies("1.2.2"));
    }

    #[test]
    fn caret_zero_major_locks_minor() {
        let spec = VersionSpecifier::parse("^0.2.3");
        assert!(spec.satisfies("0.2.3"));
        assert!(spec.satisfies("0.2.9"));
        assert!(!spec.satisfies("0.3.0"));
        assert!(!spec.satisfies("1.0.0"));
    }

    #[test]
    fn caret_zero_zero_is_exact_patch() {
        let spec = VersionSpecifier::parse("^0.0.5");
        assert!(spec.satisfies("0.0.5"));
        assert!(!spec.satisfies("0.0.6"));
        assert!(!spec.satisfies("0.0.4"));
    }

    #[test]
    fn tilde_arity_controls_scope() {
        assert!(VersionSpecifier::parse("~1").satisfies("1.9.9"));
        assert!(!VersionSpecifier::parse("~1").satisfies("2.0.0"));

        assert!(VersionSpecifier::parse("~1.2").satisfies("1.2.9"));
        assert!(!VersionSpecifier::parse("~1.2").satisfies("1.3.0"));

        assert!(VersionSpecifier::parse("~1.2.3").satisfies("1.2.7"));
        assert!(!VersionSpecifier::parse("~1.2.3").satisfies("1.2.2"));
    }

    #[test]
    fn comparators_are_strict_numeric() {
        assert!(VersionSpecifier::parse(">=1.0.0").satisfies("1.0.0"));
        assert!(VersionSpecifier::parse(">1.0.0").satisfies("1.0.1"));
        assert!(!VersionSpecifier::parse(">1.0.0").satisfies("1.0.0"));
        assert!(VersionSpecifier::parse("!=1.0.0").satisfies("1.0.1"));
    }

    #[test]
    fn unparseable_specifier_falls_back_to_string_equality() {
        let spec = VersionSpecifier::parse(">=1.0.0-rc");
        assert!(spec.satisfies(">=1.0.0-rc"));
        assert!(!spec.satisfies("1.0.0"));
    }

    #[test]
    fn pick_highest_selects_best_satisfying_candidate() {
        let spec = VersionSpecifier::parse("~1.2.0");
        let candidates: Vec<String> = ["1.1.9", "1.2.0", "1.2.7", "1.3.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(pick_highest(&spec, &candidates), Some("1.2.7"));
    }
}
