//! The `Runnable` trait: the contract every action must fulfil.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::ActionError;

/// Shared context passed to every action during execution.
///
/// Defined here (in the actions crate) so both the engine and individual
/// action implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Name of the target that owns this action.
    pub target: String,
    /// ID of the request the target is being executed for.
    pub request_id: Uuid,
    /// Nesting level of the request (0 for a top-level request).
    pub depth: u32,
    /// When set, side effects are suppressed and success is reported.
    pub dry_run: bool,
}

impl ActionContext {
    pub fn new(target: impl Into<String>, request_id: Uuid) -> Self {
        Self {
            target: target.into(),
            request_id,
            depth: 0,
            dry_run: false,
        }
    }
}

/// Output captured from one action, attributed to a single target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// What an action produced.
///
/// There is no partial credit: `success` is the only thing the scheduler
/// looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    /// Process exit code, when the action was a process that exited normally.
    pub exit_code: Option<i32>,
    pub output: CapturedOutput,
    pub duration: Duration,
}

impl Outcome {
    pub fn succeeded(output: CapturedOutput) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            output,
            duration: Duration::ZERO,
        }
    }

    pub fn failed(output: CapturedOutput) -> Self {
        Self {
            success: false,
            exit_code: None,
            output,
            duration: Duration::ZERO,
        }
    }

    /// Classify a process exit code: 0 passes, anything else fails.
    pub fn from_exit_code(code: Option<i32>, output: CapturedOutput) -> Self {
        Self {
            success: code == Some(0),
            exit_code: code,
            output,
            duration: Duration::ZERO,
        }
    }

    /// Turn an `ActionError` into a failed outcome carrying the message.
    pub fn from_error(err: &ActionError) -> Self {
        Self::failed(CapturedOutput {
            stdout: String::new(),
            stderr: err.to_string(),
        })
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// The core action trait.
///
/// Implementations run to their own completion; the engine never cancels a
/// running action.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Human readable description, used in logs and log-file headers.
    fn describe(&self) -> String;

    /// Run the action once on behalf of `ctx.target`.
    async fn run(&self, ctx: &ActionContext) -> Result<Outcome, ActionError>;
}
