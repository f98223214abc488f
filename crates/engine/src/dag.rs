//! Graph building. Run this before executing a request.
//!
//! Rules enforced:
//! 1. Every requested name and every prerequisite must be registered.
//! 2. The prerequisite closure of the requested targets must be acyclic.
//!
//! Returns a [`DependencyGraph`] whose node order is a topological order
//! (prerequisites first) that follows declaration order for ties.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Target;
use crate::registry::Registry;
use crate::EngineError;

/// Node-per-target, edge-per-prerequisite view of one request.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Targets in topological order.
    nodes: Vec<Arc<Target>>,
    index: HashMap<String, usize>,
    /// `prerequisites[i]`: node indices node `i` depends on.
    prerequisites: Vec<Vec<usize>>,
    /// `dependents[i]`: node indices that depend on node `i`.
    dependents: Vec<Vec<usize>>,
    requested: Vec<usize>,
}

impl DependencyGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn target(&self, idx: usize) -> &Arc<Target> {
        &self.nodes[idx]
    }

    pub fn targets(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.nodes.iter()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn prerequisites(&self, idx: usize) -> &[usize] {
        &self.prerequisites[idx]
    }

    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// Indices of the targets named by the request.
    pub fn requested(&self) -> &[usize] {
        &self.requested
    }

    /// Target names, prerequisites before dependents.
    pub fn topological_order(&self) -> Vec<&str> {
        self.nodes.iter().map(|t| t.name.as_str()).collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current DFS path.
    Visiting,
    /// Fully resolved and already emitted.
    Done,
}

struct Frame {
    target: Arc<Target>,
    next_child: usize,
}

/// Resolve the transitive prerequisite closure of `requested`.
///
/// # Errors
/// - [`EngineError::UnknownTarget`] if a requested name or prerequisite is missing.
/// - [`EngineError::Cycle`] if a cycle is reachable from the requested names.
pub fn build(registry: &Registry, requested: &[String]) -> Result<DependencyGraph, EngineError> {
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut order: Vec<Arc<Target>> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    // -----------------------------------------------------------------------
    // 1. Iterative post-order DFS from each requested name
    // -----------------------------------------------------------------------
    for root in requested {
        if marks.contains_key(root.as_str()) {
            continue;
        }
        let target = Arc::clone(registry.lookup(root)?);
        marks.insert(target.name.clone(), Mark::Visiting);
        stack.push(Frame { target, next_child: 0 });

        while let Some(frame) = stack.last_mut() {
            let Some(child) = frame.target.prerequisites.get(frame.next_child).cloned() else {
                // All children resolved: emit the node.
                let done = stack.pop().map(|f| f.target);
                if let Some(target) = done {
                    marks.insert(target.name.clone(), Mark::Done);
                    order.push(target);
                }
                continue;
            };
            frame.next_child += 1;
            let parent = frame.target.name.clone();

            match marks.get(child.as_str()).copied() {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => {
                    return Err(EngineError::Cycle {
                        members: cycle_members(&stack, &child),
                    });
                }
                None => {
                    let target = registry.get(&child).ok_or_else(|| EngineError::UnknownTarget {
                        name: child.clone(),
                        required_by: Some(parent),
                    })?;
                    marks.insert(child, Mark::Visiting);
                    stack.push(Frame {
                        target: Arc::clone(target),
                        next_child: 0,
                    });
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // 2. Index the emitted nodes and materialise both edge directions
    // -----------------------------------------------------------------------
    let index: HashMap<String, usize> = order
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.clone(), i))
        .collect();

    let mut prerequisites = Vec::with_capacity(order.len());
    let mut dependents = vec![Vec::new(); order.len()];
    for (i, target) in order.iter().enumerate() {
        let edges: Vec<usize> = target.prerequisites.iter().map(|p| index[p.as_str()]).collect();
        for &p in &edges {
            dependents[p].push(i);
        }
        prerequisites.push(edges);
    }

    let mut requested_idx: Vec<usize> = Vec::new();
    for name in requested {
        let idx = index[name.as_str()];
        if !requested_idx.contains(&idx) {
            requested_idx.push(idx);
        }
    }

    Ok(DependencyGraph {
        nodes: order,
        index,
        prerequisites,
        dependents,
        requested: requested_idx,
    })
}

/// The DFS path from `back_edge_target` to the top of the stack, closed.
fn cycle_members(stack: &[Frame], back_edge_target: &str) -> Vec<String> {
    let start = stack
        .iter()
        .position(|f| f.target.name == back_edge_target)
        .unwrap_or(0);
    let mut members: Vec<String> = stack[start..].iter().map(|f| f.target.name.clone()).collect();
    members.push(back_edge_target.to_owned());
    members
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;

    fn registry(decls: &[(&str, &[&str])]) -> Registry {
        let mut registry = Registry::new();
        for (name, prereqs) in decls {
            registry
                .register(*name, prereqs.iter().copied(), Action::None, true)
                .expect("unique names");
        }
        registry
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn linear_chain_is_ordered_prerequisites_first() {
        // c depends on b depends on a
        let reg = registry(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let graph = build(&reg, &names(&["c"])).expect("should be valid");
        assert_eq!(graph.topological_order(), vec!["a", "b", "c"]);
        assert_eq!(graph.requested(), &[2]);
    }

    #[test]
    fn diamond_is_visited_once_in_declaration_order() {
        //   d
        //  / \
        // b   c
        //  \ /
        //   a
        let reg = registry(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        let graph = build(&reg, &names(&["d"])).expect("should be valid");
        assert_eq!(graph.topological_order(), vec!["a", "b", "c", "d"]);

        let a = graph.index_of("a").unwrap();
        assert_eq!(graph.dependents(a).len(), 2);
        assert_eq!(graph.prerequisites(graph.index_of("d").unwrap()).len(), 2);
    }

    #[test]
    fn sibling_order_follows_declaration_order() {
        let reg = registry(&[
            ("all", &["zz", "aa", "mm"]),
            ("aa", &[]),
            ("mm", &[]),
            ("zz", &[]),
        ]);
        let graph = build(&reg, &names(&["all"])).unwrap();
        assert_eq!(graph.topological_order(), vec!["zz", "aa", "mm", "all"]);
    }

    #[test]
    fn only_the_requested_closure_is_included() {
        let reg = registry(&[("a", &[]), ("b", &["a"]), ("unrelated", &[])]);
        let graph = build(&reg, &names(&["b"])).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.index_of("unrelated").is_none());
    }

    #[test]
    fn repeated_and_overlapping_requests_share_nodes() {
        let reg = registry(&[("a", &[]), ("b", &["a"]), ("c", &["a"])]);
        let graph = build(&reg, &names(&["b", "c", "b", "a"])).unwrap();
        assert_eq!(graph.topological_order(), vec!["a", "b", "c"]);
        assert_eq!(graph.requested().len(), 3);
    }

    #[test]
    fn unknown_prerequisite_names_the_dependent() {
        let reg = registry(&[("a", &["ghost"])]);
        assert!(matches!(
            build(&reg, &names(&["a"])),
            Err(EngineError::UnknownTarget { name, required_by: Some(by) })
                if name == "ghost" && by == "a"
        ));
    }

    #[test]
    fn unknown_requested_name_is_rejected() {
        let reg = registry(&[("a", &[])]);
        assert!(matches!(
            build(&reg, &names(&["nope"])),
            Err(EngineError::UnknownTarget { name, required_by: None }) if name == "nope"
        ));
    }

    #[test]
    fn cycle_is_detected_with_its_members() {
        // top -> a -> b -> c -> a  (cycle!)
        let reg = registry(&[("top", &["a"]), ("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        match build(&reg, &names(&["top"])) {
            Err(EngineError::Cycle { members }) => {
                assert_eq!(members, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let reg = registry(&[("loop", &["loop"])]);
        assert!(matches!(
            build(&reg, &names(&["loop"])),
            Err(EngineError::Cycle { members }) if members == vec!["loop", "loop"]
        ));
    }

    #[test]
    fn unreachable_cycle_does_not_matter() {
        let reg = registry(&[("ok", &[]), ("x", &["y"]), ("y", &["x"])]);
        assert!(build(&reg, &names(&["ok"])).is_ok());
    }

    #[test]
    fn wide_diamond_lattice_builds_quickly() {
        // Each layer depends on every node of the previous layer; a naive DFS
        // without a done-set would explore 8^12 paths.
        let mut reg = Registry::new();
        let mut previous: Vec<String> = Vec::new();
        for layer in 0..12 {
            let current: Vec<String> = (0..8).map(|i| format!("n{layer}_{i}")).collect();
            for name in &current {
                reg.register(name.clone(), previous.clone(), Action::None, true).unwrap();
            }
            previous = current;
        }
        reg.register("top", previous, Action::None, true).unwrap();

        let graph = build(&reg, &names(&["top"])).unwrap();
        assert_eq!(graph.len(), 12 * 8 + 1);
    }

    #[test]
    fn every_node_comes_after_its_prerequisites() {
        let reg = registry(&[
            ("all", &["test", "docs"]),
            ("test", &["build", "fixtures"]),
            ("docs", &["build"]),
            ("build", &["deps"]),
            ("fixtures", &["deps"]),
            ("deps", &[]),
        ]);
        let graph = build(&reg, &names(&["all"])).unwrap();
        for i in 0..graph.len() {
            for &p in graph.prerequisites(i) {
                assert!(p < i, "{} must come before {}", graph.target(p).name, graph.target(i).name);
            }
        }
    }
}
