//! Engine-level error types.

use thiserror::Error;

/// Structural errors produced by the engine.
///
/// Every variant aborts the request before any action runs. Action failures
/// are not errors: they become `Failed` execution records.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Registration errors ------

    /// A target name was registered twice.
    #[error("duplicate target '{0}'")]
    DuplicateTarget(String),

    // ------ Graph errors ------

    /// A requested or prerequisite name has no registry entry.
    #[error("unknown target '{name}'{}", .required_by.as_ref().map(|p| format!(" (required by '{p}')")).unwrap_or_default())]
    UnknownTarget {
        name: String,
        required_by: Option<String>,
    },

    /// The requested targets reach a dependency cycle.
    ///
    /// `members` lists the cycle in dependency order, first member repeated
    /// at the end.
    #[error("dependency cycle: {}", .members.join(" -> "))]
    Cycle { members: Vec<String> },

    /// A request named a namespace the catalog doesn't have.
    #[error("unknown namespace '{0}'")]
    UnknownNamespace(String),

    // ------ Configuration errors ------

    /// `-j 0` or a pool larger than the runtime supports.
    #[error("invalid job count {0}: must be at least 1")]
    InvalidJobs(usize),

    // ------ Loading errors ------

    #[error("failed to read declarations: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid declarations: {0}")]
    Declarations(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offenders() {
        let err = EngineError::UnknownTarget {
            name: "ghost".into(),
            required_by: Some("all".into()),
        };
        assert_eq!(err.to_string(), "unknown target 'ghost' (required by 'all')");

        let err = EngineError::UnknownTarget { name: "ghost".into(), required_by: None };
        assert_eq!(err.to_string(), "unknown target 'ghost'");

        let err = EngineError::Cycle { members: vec!["a".into(), "b".into(), "a".into()] };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }
}
