//! Sibling-plugin dependency graph traversal: depth-first, with an in-progress
//! set for cycle detection and a memoization map so each unique `kind:name@specifier`
//! key is resolved at most once per graph.
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use crate::plugin::{DependencyKind, PluginDependency, PluginRegistry, PluginStatus};
use crate::plugin::version::pick_highest;

/// One visited node in the traversal. `resolved=false` with `error` set to the
/// circular marker means the branch was cut off, not that resolution failed hard.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub key: String,
    pub resolved: bool,
    pub error: Option<String>,
}

pub struct GraphResult {
    pub nodes: Vec<GraphNode>,
    pub warnings: Vec<String>,
}

/// Traverses every sibling-plugin dependency reachable from `root_dependencies`.
/// Non-sibling dependency kinds are not traversed transitively (only sibling
/// references form a graph; packages and files are leaves).
pub async fn traverse_sibling_graph(
    registry: &PluginRegistry,
    root_dependencies: &[PluginDependency],
) -> GraphResult {
    let mut in_progress = HashSet::new();
    let mut memo = HashMap::new();
    let mut nodes = Vec::new();
    let mut warnings = Vec::new();

    for dep in root_dependencies
        .iter()
        .filter(|d| d.kind == DependencyKind::SiblingPlugin)
    {
        visit(dep, registry, &mut in_progress, &mut memo, &mut nodes, &mut warnings).await;
    }

    GraphResult { nodes, warnings }
}

fn visit<'a>(
    dep: &'a PluginDependency,
    registry: &'a PluginRegistry,
    in_progress: &'a mut HashSet<String>,
    memo: &'a mut HashMap<String, bool>,
    nodes: &'a mut Vec<GraphNode>,
    warnings: &'a mut Vec<String>,
) -> Pin<Box<dyn Future<Output = bool> + 'a>> {
    Box::pin(async move {
        let key = dep.graph_key();
        if let Some(&resolved) = memo.get(&key) {
            return resolved;
        }
        if in_progress.contains(&key) {
            warnings.push(format!("Circular dependency detected at '{key}'"));
            nodes.push(GraphNode {
                key: key.clone(),
                resolved: false,
                error: Some("Circular".to_string()),
            });
            memo.insert(key, false);
            return false;
        }

        in_progress.insert(key.clone());

        let candidates = registry.find_by_name(&dep.name).await;
        let versions: Vec<String> = candidates.iter().map(|p| p.metadata.version.clone()).collect();
        let best_version = pick_highest(&dep.specifier, &versions).map(str::to_string);

        let resolved = match best_version.and_then(|v| candidates.iter().find(|p| p.metadata.version == v)) {
            Some(plugin) if plugin.status == PluginStatus::Available => {
                for child in plugin
                    .dependencies
                    .iter()
                    .filter(|d| d.kind == DependencyKind::SiblingPlugin)
                {
                    visit(child, registry, in_progress, memo, nodes, warnings).await;
                }
                true
            }
            _ => false,
        };

        in_progress.remove(&key);
        memo.insert(key.clone(), resolved);
        nodes.push(GraphNode {
            key,
            resolved,
            error: (!resolved).then(|| "not found or not available".to_string()),
        });
        resolved
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::model::{Language, Plugin, PluginMetadata};
    use std::path::PathBuf;

    fn make_plugin(name: &str, version: &str, deps: Vec<PluginDependency>) -> Plugin {
        let mut plugin = Plugin::new(
            PluginMetadata {
                name: name.to_string(),
                version: version.to_string(),
                description: String::new(),
                language: Language::Compiled,
            },
            PathBuf::from("entry.ext"),
            PathBuf::from(format!("/plugins/{name}")),
            "hash".to_string(),
        );
        plugin.dependencies = deps;
        plugin.mark_available();
        plugin
    }

    #[tokio::test]
    async fn detects_cycle_without_infinite_recursion() {
        let registry = PluginRegistry::new();
        let a_dep = PluginDependency::parse("plugin:B@*").unwrap();
        let b_dep = PluginDependency::parse("plugin:A@*").unwrap();
        registry.register(make_plugin("A", "1.0.0", vec![a_dep.clone()])).await;
        registry.register(make_plugin("B", "1.0.0", vec![b_dep])).await;

        let result = traverse_sibling_graph(&registry, std::slice::from_ref(&a_dep)).await;
        assert!(!result.warnings.is_empty());
        assert!(result.nodes.iter().any(|n| n.error.as_deref() == Some("Circular")));
    }

    #[tokio::test]
    async fn resolves_acyclic_chain() {
        let registry = PluginRegistry::new();
        let b_dep = PluginDependency::parse("plugin:C@*").unwrap();
        let a_dep = PluginDependency::parse("plugin:B@*").unwrap();
        registry.register(make_plugin("B", "1.0.0", vec![b_dep])).await;
        registry.register(make_plugin("C", "1.0.0", vec![])).await;

        let result = traverse_sibling_graph(&registry, std::slice::from_ref(&a_dep)).await;
        assert!(result.warnings.is_empty());
        assert!(result.nodes.iter().all(|n| n.resolved));
    }
}
