//! Core domain models for the execution engine.
//!
//! Targets are immutable once registered. Execution records and reports are
//! produced fresh for every request and never outlive it.

use std::fmt;
use std::sync::Arc;

use actions::{ExternalCommand, Outcome, Runnable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Whether a nested invocation runs inside this process or in a child
/// process re-executing the engine binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    #[default]
    InProcess,
    ChildProcess,
}

/// "Invoke this engine again with a fresh target set."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursiveSpec {
    /// Targets requested from the nested invocation.
    pub targets: Vec<String>,
    /// Size of the nested invocation's own token pool.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    /// Namespace of the next topology layer; the current one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Policy override; the parent's policy is inherited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_going: Option<bool>,
    #[serde(default)]
    pub isolation: Isolation,
}

fn default_jobs() -> usize {
    1
}

impl RecursiveSpec {
    pub fn new<I, S>(targets: I, jobs: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            jobs,
            namespace: None,
            keep_going: None,
            isolation: Isolation::InProcess,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = Some(keep_going);
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    /// The explicit policy override, if any.
    pub fn policy(&self) -> Option<Policy> {
        self.keep_going.map(Policy::from_keep_going)
    }
}

/// What a target does when dispatched.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Aggregate target: succeeds as soon as it is dispatched.
    #[default]
    None,
    /// Spawn an opaque external process.
    Command(ExternalCommand),
    /// Re-enter the engine with a different target set.
    Recursive(RecursiveSpec),
    /// Any other `Runnable`, supplied in code.
    #[serde(skip)]
    Custom(Arc<dyn Runnable>),
}

impl Action {
    pub fn command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Action::Command(ExternalCommand::new(program, args))
    }

    pub fn custom(runnable: impl Runnable + 'static) -> Self {
        Action::Custom(Arc::new(runnable))
    }

    pub fn describe(&self) -> String {
        match self {
            Action::None => "(no action)".to_owned(),
            Action::Command(cmd) => cmd.command_line(),
            Action::Recursive(spec) => {
                let mut line = format!("<nested> -j {}", spec.jobs);
                if let Some(ns) = &spec.namespace {
                    line.push_str(&format!(" --namespace {ns}"));
                }
                line.push(' ');
                line.push_str(&spec.targets.join(" "));
                line
            }
            Action::Custom(runnable) => runnable.describe(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::None => f.write_str("None"),
            Action::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Action::Recursive(spec) => f.debug_tuple("Recursive").field(spec).finish(),
            Action::Custom(runnable) => f.debug_tuple("Custom").field(&runnable.describe()).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A named unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// Declaration order is preserved; duplicates are dropped on registration.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub action: Action,
    /// No durable output; re-executed by every request that reaches it.
    #[serde(default)]
    pub phony: bool,
}

impl Target {
    pub fn new<I, S>(name: impl Into<String>, prerequisites: I, action: Action, phony: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut target = Self {
            name: name.into(),
            prerequisites: prerequisites.into_iter().map(Into::into).collect(),
            action,
            phony,
        };
        target.dedup_prerequisites();
        target
    }

    pub(crate) fn dedup_prerequisites(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.prerequisites.retain(|p| seen.insert(p.clone()));
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What the scheduler does after the first failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Stop dispatching; let in-flight work drain.
    #[default]
    FailFast,
    /// Keep dispatching everything not downstream of a failure.
    KeepGoing,
}

impl Policy {
    pub fn from_keep_going(keep_going: bool) -> Self {
        if keep_going {
            Policy::KeepGoing
        } else {
            Policy::FailFast
        }
    }
}

// ---------------------------------------------------------------------------
// Execution records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TargetState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TargetState::Succeeded | TargetState::Failed | TargetState::Skipped)
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetState::Pending => "pending",
            TargetState::Ready => "ready",
            TargetState::Running => "running",
            TargetState::Succeeded => "ok",
            TargetState::Failed => "FAILED",
            TargetState::Skipped => "skipped",
        }
    }
}

/// Per-target, per-request execution state.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub target: String,
    pub phony: bool,
    pub state: TargetState,
    pub outcome: Option<Outcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Why a `Skipped` target never ran.
    pub skip_reason: Option<String>,
}

impl ExecutionRecord {
    pub fn pending(target: &Target) -> Self {
        Self {
            target: target.name.clone(),
            phony: target.phony,
            state: TargetState::Pending,
            outcome: None,
            started_at: None,
            finished_at: None,
            skip_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    Succeeded,
    Failed,
}

/// Everything one request produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub request_id: Uuid,
    pub namespace: String,
    pub depth: u32,
    pub result: RunResult,
    /// One record per graph node, in topological order.
    pub records: Vec<ExecutionRecord>,
    /// Target names in the order they were handed to workers.
    pub dispatch_order: Vec<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.result == RunResult::Succeeded
    }

    pub fn record(&self, target: &str) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.target == target)
    }

    pub fn state_of(&self, target: &str) -> Option<TargetState> {
        self.record(target).map(|r| r.state)
    }

    pub fn count(&self, state: TargetState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    pub fn failed_targets(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| r.state == TargetState::Failed)
            .map(|r| r.target.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisites_are_deduplicated_in_declaration_order() {
        let t = Target::new("all", ["b", "a", "b", "c", "a"], Action::None, true);
        assert_eq!(t.prerequisites, vec!["b", "a", "c"]);
    }

    #[test]
    fn action_deserialises_from_tagged_json() {
        let action: Action = serde_json::from_str(
            r#"{ "type": "recursive", "targets": ["all"], "jobs": 4, "namespace": "mid" }"#,
        )
        .expect("valid action");
        match action {
            Action::Recursive(spec) => {
                assert_eq!(spec.targets, vec!["all"]);
                assert_eq!(spec.jobs, 4);
                assert_eq!(spec.namespace.as_deref(), Some("mid"));
                assert_eq!(spec.isolation, Isolation::InProcess);
                assert_eq!(spec.policy(), None);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn missing_action_means_aggregate_target() {
        let target: Target =
            serde_json::from_str(r#"{ "name": "test-bot", "prerequisites": ["bot0"] }"#).unwrap();
        assert!(matches!(target.action, Action::None));
        assert!(!target.phony);
    }

    #[test]
    fn terminal_states() {
        assert!(TargetState::Skipped.is_terminal());
        assert!(!TargetState::Running.is_terminal());
        assert!(!TargetState::Ready.is_terminal());
    }
}
