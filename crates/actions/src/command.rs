//! `ExternalCommand` runs an opaque executable and classifies its exit code.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::{ActionContext, ActionError, CapturedOutput, Outcome, Runnable};

/// Environment variable carrying the nesting level of the invoking request.
pub const LEVEL_ENV: &str = "JOBTREE_LEVEL";
/// Environment variable carrying the name of the owning target.
pub const TARGET_ENV: &str = "JOBTREE_TARGET";

/// An executable path plus an ordered argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, on top of the inherited environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Working directory; inherited when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            dir: None,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-ish rendering of the argv for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Runnable for ExternalCommand {
    fn describe(&self) -> String {
        self.command_line()
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome, ActionError> {
        if ctx.dry_run {
            return Ok(Outcome::succeeded(CapturedOutput::from_stdout(format!(
                "would run: {}\n",
                self.command_line()
            ))));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .env(LEVEL_ENV, ctx.depth.to_string())
            .env(TARGET_ENV, &ctx.target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        debug!(target_name = %ctx.target, "spawning '{}'", self.command_line());
        let started = Instant::now();

        let child = cmd.spawn().map_err(|source| ActionError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ActionError::Wait {
                program: self.program.clone(),
                source,
            })?;

        let captured = CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        Ok(Outcome::from_exit_code(output.status.code(), captured)
            .with_duration(started.elapsed()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx(target: &str) -> ActionContext {
        ActionContext::new(target, Uuid::new_v4())
    }

    #[tokio::test]
    async fn zero_exit_is_success_and_output_is_captured() {
        let cmd = ExternalCommand::new("sh", ["-c", "echo hello; echo oops >&2"]);
        let outcome = cmd.run(&ctx("greet")).await.expect("spawns");
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.output.stdout, "hello\n");
        assert_eq!(outcome.output.stderr, "oops\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        let cmd = ExternalCommand::new("sh", ["-c", "exit 3"]);
        let outcome = cmd.run(&ctx("fail")).await.expect("spawns");
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let cmd = ExternalCommand::new("/definitely/not/a/program", Vec::<String>::new());
        let err = cmd.run(&ctx("ghost")).await.unwrap_err();
        assert!(matches!(err, ActionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn level_and_target_are_exported() {
        let cmd = ExternalCommand::new("sh", ["-c", "echo $JOBTREE_LEVEL:$JOBTREE_TARGET:$EXTRA"])
            .env("EXTRA", "x");
        let mut context = ctx("leaf");
        context.depth = 2;
        let outcome = cmd.run(&context).await.expect("spawns");
        assert_eq!(outcome.output.stdout, "2:leaf:x\n");
    }

    #[tokio::test]
    async fn dry_run_does_not_spawn() {
        let cmd = ExternalCommand::new("/definitely/not/a/program", ["--flag"]);
        let mut context = ctx("ghost");
        context.dry_run = true;
        let outcome = cmd.run(&context).await.expect("dry run never spawns");
        assert!(outcome.success);
        assert!(outcome.output.stdout.contains("would run: /definitely/not/a/program --flag"));
    }
}
