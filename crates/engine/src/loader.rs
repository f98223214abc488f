//! Target declaration loader (JSON).
//!
//! ```json
//! {
//!   "targets": [ { "name": "all", "prerequisites": ["a"] }, ... ],
//!   "namespaces": { "bot": [ ... ] }
//! }
//! ```
//!
//! Everything is registered through [`Registry::insert`], so the usual
//! duplicate check applies per namespace.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::models::Target;
use crate::registry::{Catalog, Registry, ROOT_NAMESPACE};
use crate::EngineError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Declarations {
    #[serde(default)]
    targets: Vec<Target>,
    #[serde(default)]
    namespaces: BTreeMap<String, Vec<Target>>,
}

fn registry_of(targets: Vec<Target>) -> Result<Registry, EngineError> {
    let mut registry = Registry::new();
    for target in targets {
        registry.insert(target)?;
    }
    Ok(registry)
}

/// Parse declarations from a JSON string.
pub fn load_str(json: &str) -> Result<Catalog, EngineError> {
    let decls: Declarations = serde_json::from_str(json)?;

    let mut root = decls.targets;
    let mut catalog = Catalog::default();
    for (name, targets) in decls.namespaces {
        if name == ROOT_NAMESPACE {
            root.extend(targets);
            continue;
        }
        debug!("namespace '{name}': {} targets", targets.len());
        catalog.insert_namespace(name, registry_of(targets)?);
    }
    catalog.insert_namespace(ROOT_NAMESPACE, registry_of(root)?);
    Ok(catalog)
}

/// Read and parse a declarations file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Catalog, EngineError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    load_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, Isolation};

    const LAYERED: &str = r#"{
        "targets": [
            { "name": "all", "prerequisites": ["test-mid"], "phony": true },
            { "name": "test-mid", "phony": true,
              "action": { "type": "recursive", "namespace": "mid", "targets": ["all"], "jobs": 4,
                          "keep_going": true, "isolation": "child_process" } }
        ],
        "namespaces": {
            "mid": [
                { "name": "all", "prerequisites": ["client"] },
                { "name": "client", "phony": true,
                  "action": { "type": "command", "program": "./client.sh", "args": ["-v"],
                              "env": { "MODE": "fast" } } }
            ]
        }
    }"#;

    #[test]
    fn loads_root_and_namespaces() {
        let catalog = load_str(LAYERED).expect("valid declarations");

        let root = catalog.namespace(ROOT_NAMESPACE).unwrap();
        assert_eq!(root.len(), 2);
        match &root.lookup("test-mid").unwrap().action {
            Action::Recursive(spec) => {
                assert_eq!(spec.namespace.as_deref(), Some("mid"));
                assert_eq!(spec.jobs, 4);
                assert_eq!(spec.keep_going, Some(true));
                assert_eq!(spec.isolation, Isolation::ChildProcess);
            }
            other => panic!("unexpected action {other:?}"),
        }

        let mid = catalog.namespace("mid").unwrap();
        match &mid.lookup("client").unwrap().action {
            Action::Command(cmd) => {
                assert_eq!(cmd.program, "./client.sh");
                assert_eq!(cmd.args, vec!["-v"]);
                assert_eq!(cmd.env.get("MODE").map(String::as_str), Some("fast"));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn demo_topology_resolves_in_every_layer() {
        let catalog = load_str(include_str!("../../../demos/topology.json")).expect("demo loads");
        let root = catalog.namespace(ROOT_NAMESPACE).unwrap();
        let graph = crate::dag::build(root, &["test".to_string()]).unwrap();
        assert_eq!(graph.topological_order(), vec!["test-mid", "test"]);

        let bot = catalog.namespace("bot").unwrap();
        let graph = crate::dag::build(bot, &["test-bot".to_string()]).unwrap();
        assert_eq!(graph.len(), 11);
    }

    #[test]
    fn duplicate_names_in_one_namespace_are_rejected() {
        let json = r#"{ "targets": [ { "name": "a" }, { "name": "a" } ] }"#;
        assert!(matches!(load_str(json), Err(EngineError::DuplicateTarget(n)) if n == "a"));
    }

    #[test]
    fn same_name_in_different_namespaces_is_fine() {
        let json = r#"{ "targets": [ { "name": "all" } ], "namespaces": { "bot": [ { "name": "all" } ] } }"#;
        assert!(load_str(json).is_ok());
    }

    #[test]
    fn malformed_json_is_a_declarations_error() {
        assert!(matches!(load_str("{ nope"), Err(EngineError::Declarations(_))));
        assert!(matches!(
            load_str(r#"{ "targets": [ { "name": "x", "action": { "type": "teleport" } } ] }"#),
            Err(EngineError::Declarations(_))
        ));
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobtree.json");
        std::fs::write(&path, LAYERED).unwrap();
        let catalog = load_file(&path).unwrap();
        assert_eq!(catalog.namespaces().count(), 2);

        assert!(matches!(load_file(dir.path().join("missing.json")), Err(EngineError::Io(_))));
    }
}
